//! Error types for hwledger operations
//!
//! One crate-wide error enum covers configuration mistakes, device and
//! provider failures, validation errors raised before a transaction build,
//! and local storage problems. Provider failures are never surfaced raw:
//! they go through [`remap_provider_error`] first.

use thiserror::Error;

use crate::device::DeviceError;
use crate::provider::{ProviderError, ProviderErrorCode};

#[derive(Error, Debug)]
pub enum HwLedgerError {
    #[error("Derivation mode '{mode}' is not supported for {currency}")]
    UnsupportedDerivationMode { currency: String, mode: String },

    #[error("Fresh address unavailable for account {0}")]
    FreshAddressUnavailable(String),

    #[error("Invalid {currency_name} address: {address}")]
    InvalidAddress {
        currency_name: String,
        address: String,
    },

    #[error("Fee rate is missing")]
    FeeMissing,

    #[error("Amount is missing")]
    AmountMissing,

    #[error("Not enough balance")]
    NotEnoughBalance,

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Currency family '{0}' is not supported")]
    FamilyNotSupported(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

impl HwLedgerError {
    /// Create an unsupported derivation mode error
    pub fn unsupported_mode(currency: impl Into<String>, mode: impl Into<String>) -> Self {
        Self::UnsupportedDerivationMode {
            currency: currency.into(),
            mode: mode.into(),
        }
    }

    /// Create a sync error
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Whether this error only invalidates the current account and the
    /// surrounding walk may carry on.
    pub fn is_account_local(&self) -> bool {
        matches!(self, Self::FreshAddressUnavailable(_))
    }
}

/// Translate a provider failure into a domain error.
///
/// Known native codes map to dedicated kinds; every other failure becomes a
/// [`HwLedgerError::Sync`] carrying the provider's message.
pub fn remap_provider_error(err: ProviderError) -> HwLedgerError {
    match err.code {
        Some(ProviderErrorCode::NotEnoughFunds) => HwLedgerError::NotEnoughBalance,
        _ => HwLedgerError::Sync(err.message),
    }
}
