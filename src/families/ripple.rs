//! Ripple-like family: accounts are keyed by address, fees are flat

use async_trait::async_trait;
use serde_json::{json, Value};

use super::CurrencyFamily;
use crate::account::Account;
use crate::currency::CryptoCurrency;
use crate::error::HwLedgerError;
use crate::operation::{FamilyOperationFields, PartialOperation, RawOperation};
use crate::provider::AccountStateProvider;
use crate::transaction::{plan_transfer, FeeModel, TransactionIntent, TransactionPlan};

pub struct RippleFamily;

#[async_trait]
impl CurrencyFamily for RippleFamily {
    fn name(&self) -> &'static str {
        "ripple"
    }

    fn uses_extended_keys(&self) -> bool {
        false
    }

    fn interpret_operation(
        &self,
        raw: &RawOperation,
        _partial: &PartialOperation,
    ) -> Result<Option<FamilyOperationFields>, HwLedgerError> {
        let mut extra = json!({});
        if let Some(tag) = raw.payload.get("destination_tag").and_then(Value::as_u64) {
            extra["destination_tag"] = json!(tag);
        }
        Ok(Some(FamilyOperationFields {
            hash: raw.transaction_hash.clone(),
            extra,
            block_hash: None,
            transaction_sequence_number: raw.payload.get("sequence").and_then(Value::as_u64),
            has_failed: false,
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
        // fee_per_unit is the flat fee in drops
        plan_transfer(
            provider,
            currency,
            account,
            intent,
            is_cancelled,
            FeeModel::Fixed { units: 1 },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{build_operation, RawOperationType};

    #[test]
    fn test_sequence_and_destination_tag() {
        let raw = RawOperation {
            operation_type: RawOperationType::Send,
            transaction_hash: "E3FE6EA3".to_string(),
            amount: 25_000_000,
            fee: Some(12),
            senders: vec!["rSender".to_string()],
            recipients: vec!["rDest".to_string()],
            block_height: Some(80_000_000),
            block_hash: None,
            date_epoch_ms: 1_700_000_000_000,
            payload: json!({ "sequence": 41, "destination_tag": 1337 }),
        };
        let op = build_operation(&raw, "acc", &RippleFamily).unwrap().unwrap();
        assert_eq!(op.value, 25_000_012);
        assert_eq!(op.transaction_sequence_number, Some(41));
        assert_eq!(op.extra["destination_tag"], 1337);
        assert!(!op.has_failed);
    }
}
