//! Per-family capabilities
//!
//! Each currency family (bitcoin-like, ethereum-like, ripple-like)
//! implements [`CurrencyFamily`] once. The [`FamilyRegistry`] is built at
//! startup, handed to the walker context and never mutated afterwards.

pub mod bitcoin;
pub mod ethereum;
pub mod ripple;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::account::{Account, SubAccount};
use crate::currency::CryptoCurrency;
use crate::error::HwLedgerError;
use crate::operation::{FamilyOperationFields, PartialOperation, RawOperation};
use crate::provider::AccountStateProvider;
use crate::transaction::{TransactionIntent, TransactionPlan};

#[async_trait]
pub trait CurrencyFamily: Send + Sync {
    /// Registry key, matches [`CryptoCurrency::family`]
    fn name(&self) -> &'static str;

    /// Accounts are keyed by an extended public key rather than an address
    fn uses_extended_keys(&self) -> bool;

    /// Family-specific operation fields; `Ok(None)` skips the record
    fn interpret_operation(
        &self,
        raw: &RawOperation,
        partial: &PartialOperation,
    ) -> Result<Option<FamilyOperationFields>, HwLedgerError>;

    /// Token sub-accounts derived from the raw history
    fn build_sub_accounts(
        &self,
        _parent_id: &str,
        _raw_operations: &[RawOperation],
        _existing: &[SubAccount],
    ) -> Result<Vec<SubAccount>, HwLedgerError> {
        Ok(Vec::new())
    }

    /// Adjust a re-synced account using the state it had before the sync
    fn post_sync_patch(&self, _initial: &Account, synced: Account) -> Account {
        synced
    }

    /// Validate a transfer intent and decide how it will be built.
    ///
    /// Returns `Ok(None)` when `is_cancelled` fires before the decision.
    async fn prepare_transaction(
        &self,
        provider: &dyn AccountStateProvider,
        currency: &CryptoCurrency,
        account: &Account,
        intent: &TransactionIntent,
        is_cancelled: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<Option<TransactionPlan>, HwLedgerError>;
}

/// Immutable lookup table from family tag to capability
#[derive(Clone, Default)]
pub struct FamilyRegistry {
    families: HashMap<&'static str, Arc<dyn CurrencyFamily>>,
}

impl FamilyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every family this crate ships
    pub fn builtin() -> Self {
        Self::new()
            .with_family(Arc::new(bitcoin::BitcoinFamily))
            .with_family(Arc::new(ethereum::EthereumFamily))
            .with_family(Arc::new(ripple::RippleFamily))
    }

    pub fn with_family(mut self, family: Arc<dyn CurrencyFamily>) -> Self {
        self.families.insert(family.name(), family);
        self
    }

    pub fn get(&self, family: &str) -> Result<&Arc<dyn CurrencyFamily>, HwLedgerError> {
        self.families
            .get(family)
            .ok_or_else(|| HwLedgerError::FamilyNotSupported(family.to_string()))
    }

    pub fn for_currency(
        &self,
        currency: &CryptoCurrency,
    ) -> Result<&Arc<dyn CurrencyFamily>, HwLedgerError> {
        self.get(currency.family)
    }
}

impl std::fmt::Debug for FamilyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.families.keys().collect();
        names.sort();
        f.debug_struct("FamilyRegistry").field("families", &names).finish()
    }
}
