//! Ethereum-like family: accounts are keyed by address, token transfers
//! become sub-accounts

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::CurrencyFamily;
use crate::account::{Account, SubAccount};
use crate::currency::CryptoCurrency;
use crate::error::HwLedgerError;
use crate::operation::{
    FamilyOperationFields, Operation, OperationType, PartialOperation, RawOperation,
    RawOperationType,
};
use crate::provider::AccountStateProvider;
use crate::reconciliation::reconcile_operations;
use crate::transaction::{plan_transfer, FeeModel, TransactionIntent, TransactionPlan};

/// Gas used by a plain value transfer
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

pub struct EthereumFamily;

fn payload_u64(payload: &Value, key: &str) -> Option<u64> {
    payload.get(key).and_then(Value::as_u64)
}

/// `(token id, token amount)` carried by a token transfer
fn token_transfer(raw: &RawOperation) -> Option<(&str, u64)> {
    let token = raw.payload.get("token")?;
    let id = token.get("id")?.as_str()?;
    let value = token.get("value")?.as_u64()?;
    Some((id, value))
}

fn token_operation(
    raw: &RawOperation,
    sub_account_id: &str,
    amount: u64,
) -> Result<Option<Operation>, HwLedgerError> {
    let op_type = match raw.operation_type {
        RawOperationType::Send => OperationType::Out,
        RawOperationType::Receive => OperationType::In,
        RawOperationType::Unknown => return Ok(None),
    };
    let date = DateTime::<Utc>::from_timestamp_millis(raw.date_epoch_ms).ok_or_else(|| {
        HwLedgerError::invalid_operation(format!("invalid date (tx {})", raw.transaction_hash))
    })?;
    Ok(Some(Operation {
        id: Operation::make_id(sub_account_id, &raw.transaction_hash, op_type),
        hash: raw.transaction_hash.clone(),
        op_type,
        value: amount,
        fee: raw.fee.unwrap_or(0),
        senders: raw.senders.clone(),
        recipients: raw.recipients.clone(),
        block_height: raw.block_height,
        block_hash: raw.block_hash.clone(),
        transaction_sequence_number: payload_u64(&raw.payload, "nonce"),
        account_id: sub_account_id.to_string(),
        date,
        extra: json!({}),
        has_failed: is_failed(raw),
    }))
}

fn is_failed(raw: &RawOperation) -> bool {
    payload_u64(&raw.payload, "status") == Some(0)
}

#[async_trait]
impl CurrencyFamily for EthereumFamily {
    fn name(&self) -> &'static str {
        "ethereum"
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
        if let Some(gas_used) = payload_u64(&raw.payload, "gas_used") {
            extra["gas_used"] = json!(gas_used);
        }
        Ok(Some(FamilyOperationFields {
            hash: raw.transaction_hash.clone(),
            extra,
            block_hash: None,
            transaction_sequence_number: payload_u64(&raw.payload, "nonce"),
            has_failed: is_failed(raw),
        }))
    }

    fn build_sub_accounts(
        &self,
        parent_id: &str,
        raw_operations: &[RawOperation],
        existing: &[SubAccount],
    ) -> Result<Vec<SubAccount>, HwLedgerError> {
        let mut token_ids: Vec<String> = existing.iter().map(|s| s.token_id.clone()).collect();
        let mut transfers: HashMap<&str, Vec<(&RawOperation, u64)>> = HashMap::new();
        for raw in raw_operations {
            if let Some((token_id, amount)) = token_transfer(raw) {
                if !token_ids.iter().any(|t| t == token_id) {
                    token_ids.push(token_id.to_string());
                }
                transfers.entry(token_id).or_default().push((raw, amount));
            }
        }

        let mut sub_accounts = Vec::with_capacity(token_ids.len());
        for token_id in token_ids {
            let id = SubAccount::make_id(parent_id, &token_id);
            let previous = existing
                .iter()
                .find(|s| s.token_id == token_id)
                .map(|s| s.operations.as_slice())
                .unwrap_or_default();
            let fresh = transfers.remove(token_id.as_str()).unwrap_or_default();
            let operations = reconcile_operations(previous, &fresh, |(raw, amount)| {
                token_operation(raw, &id, *amount)
            })?;

            let (received, sent) = operations
                .iter()
                .filter(|op| !op.has_failed)
                .fold((0u64, 0u64), |(received, sent), op| match op.op_type {
                    OperationType::In => (received.saturating_add(op.value), sent),
                    OperationType::Out => (received, sent.saturating_add(op.value)),
                });
            let balance = received.saturating_sub(sent);

            sub_accounts.push(SubAccount {
                id,
                parent_id: parent_id.to_string(),
                token_id,
                balance,
                operations,
            });
        }
        Ok(sub_accounts)
    }

    /// Keeps locally broadcast transactions the provider has not seen yet
    fn post_sync_patch(&self, initial: &Account, mut synced: Account) -> Account {
        let last_nonce = synced
            .operations
            .iter()
            .filter(|op| op.op_type == OperationType::Out)
            .filter_map(|op| op.transaction_sequence_number)
            .max();
        synced.pending_operations = initial
            .pending_operations
            .iter()
            .filter(|pending| !synced.operations.iter().any(|op| op.hash == pending.hash))
            .filter(|pending| match (pending.transaction_sequence_number, last_nonce) {
                (Some(nonce), Some(last)) => nonce > last,
                _ => true,
            })
            .cloned()
            .collect();
        synced
    }

    async fn prepare_transaction(
        &self,
        provider: &dyn AccountStateProvider,
        currency: &CryptoCurrency,
        account: &Account,
        intent: &TransactionIntent,
        is_cancelled: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<Option<TransactionPlan>, HwLedgerError> {
        plan_transfer(
            provider,
            currency,
            account,
            intent,
            is_cancelled,
            FeeModel::Fixed {
                units: TRANSFER_GAS_LIMIT,
            },
        )
        .await
    }
}
