//! Ledger operations
//!
//! [`RawOperation`] is the provider-native record returned by
//! `getOperations`; [`Operation`] is the canonical entry kept in an account's
//! history. [`build_operation`] turns the former into the latter, applying the
//! value convention (OUT includes the fee, IN excludes it) and delegating the
//! family-specific fields to the currency family's interpreter.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HwLedgerError;
use crate::families::CurrencyFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical history entry
///
/// `block_height` and `block_hash` stay `None` while the transaction is
/// unconfirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// `{account_id}-{hash}-{type}`
    pub id: String,
    pub hash: String,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Always non-negative; includes the fee for OUT, excludes it for IN
    pub value: u64,
    pub fee: u64,
    pub senders: Vec<String>,
    pub recipients: Vec<String>,
    pub block_height: Option<u64>,
    pub block_hash: Option<String>,
    /// Nonce / sequence number on chains that have one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_sequence_number: Option<u64>,
    pub account_id: String,
    pub date: DateTime<Utc>,
    /// Currency specific payload
    #[serde(default)]
    pub extra: Value,
    #[serde(default)]
    pub has_failed: bool,
}

impl Operation {
    pub fn make_id(account_id: &str, hash: &str, op_type: OperationType) -> String {
        format!("{}-{}-{}", account_id, hash, op_type)
    }

    /// Whether the confirmation data differs from `other`
    pub fn block_data_differs(&self, other: &Operation) -> bool {
        self.block_height != other.block_height || self.block_hash != other.block_hash
    }
}

/// Direction reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawOperationType {
    Send,
    Receive,
    /// Anything the provider could not classify
    #[serde(other)]
    Unknown,
}

/// Provider-native operation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOperation {
    pub operation_type: RawOperationType,
    pub transaction_hash: String,
    pub amount: u64,
    pub fee: Option<u64>,
    #[serde(default)]
    pub senders: Vec<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    pub date_epoch_ms: i64,
    /// Family specific fields, read by the family interpreter
    #[serde(default)]
    pub payload: Value,
}

/// Fields computed before the family interpreter runs
#[derive(Debug, Clone, PartialEq)]
pub struct PartialOperation {
    pub op_type: OperationType,
    pub value: u64,
    pub fee: u64,
    pub senders: Vec<String>,
    pub recipients: Vec<String>,
    pub block_height: Option<u64>,
    pub block_hash: Option<String>,
    pub account_id: String,
    pub date: DateTime<Utc>,
}

/// Fields contributed by the family interpreter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyOperationFields {
    pub hash: String,
    pub extra: Value,
    /// Overrides the provider's block hash when set
    pub block_hash: Option<String>,
    pub transaction_sequence_number: Option<u64>,
    pub has_failed: bool,
}

/// Build the canonical operation for one raw record.
///
/// Returns `Ok(None)` for records that cannot be classified or that the
/// family interpreter declines; those are skipped. A record without a fee
/// is an error: the operation cannot be partially interpreted.
pub fn build_operation(
    raw: &RawOperation,
    account_id: &str,
    family: &dyn CurrencyFamily,
) -> Result<Option<Operation>, HwLedgerError> {
    let op_type = match raw.operation_type {
        RawOperationType::Send => OperationType::Out,
        RawOperationType::Receive => OperationType::In,
        RawOperationType::Unknown => {
            log::debug!(
                "Skipping unclassified operation {} for {}",
                raw.transaction_hash,
                account_id
            );
            return Ok(None);
        }
    };

    let fee = raw.fee.ok_or_else(|| {
        HwLedgerError::invalid_operation(format!(
            "fees should not be null (tx {})",
            raw.transaction_hash
        ))
    })?;

    let value = match op_type {
        OperationType::Out => raw.amount.checked_add(fee).ok_or_else(|| {
            HwLedgerError::invalid_operation(format!(
                "value overflow (tx {})",
                raw.transaction_hash
            ))
        })?,
        OperationType::In => raw.amount,
    };

    let date = DateTime::<Utc>::from_timestamp_millis(raw.date_epoch_ms).ok_or_else(|| {
        HwLedgerError::invalid_operation(format!(
            "invalid date {} (tx {})",
            raw.date_epoch_ms, raw.transaction_hash
        ))
    })?;

    let partial = PartialOperation {
        op_type,
        value,
        fee,
        senders: raw.senders.clone(),
        recipients: raw.recipients.clone(),
        block_height: raw.block_height,
        block_hash: raw.block_hash.clone(),
        account_id: account_id.to_string(),
        date,
    };

    let Some(fields) = family.interpret_operation(raw, &partial)? else {
        return Ok(None);
    };

    Ok(Some(Operation {
        id: Operation::make_id(account_id, &fields.hash, op_type),
        hash: fields.hash,
        op_type,
        value: partial.value,
        fee: partial.fee,
        senders: partial.senders,
        recipients: partial.recipients,
        block_height: partial.block_height,
        block_hash: fields.block_hash.or(partial.block_hash),
        transaction_sequence_number: fields.transaction_sequence_number,
        account_id: partial.account_id,
        date: partial.date,
        extra: fields.extra,
        has_failed: fields.has_failed,
    }))
}
