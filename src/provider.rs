//! Account-state provider boundary
//!
//! The provider is the external service that, given an account identity
//! (extended public key or address plus keychain engine), answers with the
//! balance, chain height, next receive address and raw operation history.
//! Wire encoding and transport are the implementor's business; this module
//! only fixes the contract and the error shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::derivation::{DerivationMode, KeychainEngine};
use crate::error::{remap_provider_error, HwLedgerError};
use crate::operation::RawOperation;

/// Native error codes the core knows how to translate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderErrorCode {
    NotEnoughFunds,
    Other(i32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<ProviderErrorCode>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// What the provider needs to locate an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub currency_id: String,
    pub currency_name: String,
    pub xpub_or_address: String,
    pub derivation_mode: DerivationMode,
    pub keychain_engine: KeychainEngine,
    /// Account root path, e.g. `84'/0'/1'`
    pub account_path: String,
    pub index: u32,
}

/// Next unused receive address
///
/// `path_suffix` is either relative to the account root (`0/3`) or a fully
/// qualified path; it may be empty when the provider only knows the address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshAddress {
    pub address: String,
    pub path_suffix: String,
}

#[async_trait]
pub trait AccountStateProvider: Send + Sync {
    /// Ask the provider to bring its view of the account up to date.
    async fn sync(&self, _identity: &AccountIdentity) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_balance(&self, identity: &AccountIdentity) -> Result<u64, ProviderError>;

    async fn get_last_block_height(&self, identity: &AccountIdentity)
        -> Result<u64, ProviderError>;

    async fn get_fresh_address(
        &self,
        identity: &AccountIdentity,
    ) -> Result<FreshAddress, ProviderError>;

    async fn get_operations(
        &self,
        identity: &AccountIdentity,
    ) -> Result<Vec<RawOperation>, ProviderError>;

    async fn is_address_valid(
        &self,
        currency_name: &str,
        address: &str,
    ) -> Result<bool, ProviderError>;
}

/// Everything the snapshot builder needs from the provider for one account
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSnapshot {
    pub balance: u64,
    pub block_height: u64,
    pub fresh_address: FreshAddress,
    pub raw_operations: Vec<RawOperation>,
}

/// Fetch a full snapshot, one request at a time.
///
/// `is_cancelled` is polled before every request; `Ok(None)` means the
/// caller cancelled and no further request was issued. Provider failures are
/// remapped before they leave this function.
pub async fn fetch_snapshot(
    provider: &dyn AccountStateProvider,
    identity: &AccountIdentity,
    is_cancelled: &(dyn Fn() -> bool + Send + Sync),
) -> Result<Option<ProviderSnapshot>, HwLedgerError> {
    if is_cancelled() {
        return Ok(None);
    }
    provider.sync(identity).await.map_err(remap_provider_error)?;

    if is_cancelled() {
        return Ok(None);
    }
    let balance = provider
        .get_balance(identity)
        .await
        .map_err(remap_provider_error)?;

    if is_cancelled() {
        return Ok(None);
    }
    let block_height = provider
        .get_last_block_height(identity)
        .await
        .map_err(remap_provider_error)?;

    if is_cancelled() {
        return Ok(None);
    }
    let fresh_address = provider
        .get_fresh_address(identity)
        .await
        .map_err(remap_provider_error)?;

    if is_cancelled() {
        return Ok(None);
    }
    let raw_operations = provider
        .get_operations(identity)
        .await
        .map_err(remap_provider_error)?;

    log::debug!(
        "Fetched snapshot for {} ({} raw operations, height {})",
        identity.account_path,
        raw_operations.len(),
        block_height
    );

    Ok(Some(ProviderSnapshot {
        balance,
        block_height,
        fresh_address,
        raw_operations,
    }))
}
