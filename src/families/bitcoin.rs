//! Bitcoin-like family: accounts are keyed by BIP32 xpubs

use async_trait::async_trait;
use serde_json::json;

use super::CurrencyFamily;
use crate::account::Account;
use crate::currency::CryptoCurrency;
use crate::error::HwLedgerError;
use crate::operation::{FamilyOperationFields, PartialOperation, RawOperation};
use crate::provider::AccountStateProvider;
use crate::transaction::{plan_transfer, FeeModel, TransactionIntent, TransactionPlan};

pub struct BitcoinFamily;

#[async_trait]
impl CurrencyFamily for BitcoinFamily {
    fn name(&self) -> &'static str {
        "bitcoin"
    }

    fn uses_extended_keys(&self) -> bool {
        true
    }

    fn interpret_operation(
        &self,
        raw: &RawOperation,
        _partial: &PartialOperation,
    ) -> Result<Option<FamilyOperationFields>, HwLedgerError> {
        Ok(Some(FamilyOperationFields {
            hash: raw.transaction_hash.clone(),
            extra: json!({}),
            ..Default::default()
        }))
    }

    async fn prepare_transaction(
        &self,
        provider: &dyn AccountStateProvider,
        currency: &CryptoCurrency,
        account: &Account,
        intent: &TransactionIntent,
        is_cancelled: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<Option<TransactionPlan>, HwLedgerError> {
        plan_transfer(provider, currency, account, intent, is_cancelled, FeeModel::PerByte).await
    }
}
