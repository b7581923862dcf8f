//! Transaction preparation
//!
//! The single decision point that picks the family builder for an account
//! and validates a transfer intent before anything is built. Assembling and
//! signing the transaction itself happens downstream of the returned
//! [`TransactionPlan`].

use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::context::WalkerContext;
use crate::currency::{get_currency_by_id, CryptoCurrency};
use crate::error::{remap_provider_error, HwLedgerError};
use crate::provider::AccountStateProvider;

/// What the user asked to send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub recipient: String,
    pub amount: Option<u64>,
    /// Fee per byte, gas price or flat fee depending on the family
    pub fee_per_unit: Option<u64>,
    #[serde(default)]
    pub use_all_amount: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferAmount {
    /// Sweep the whole balance minus fees
    All,
    Exact(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub account_id: String,
    pub recipient: String,
    pub amount: TransferAmount,
    pub fee_per_unit: u64,
    /// Known up front only for families with a fixed fee size
    pub estimated_fee: Option<u64>,
}

/// How a family turns `fee_per_unit` into a total fee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeModel {
    /// Depends on the inputs picked at build time
    PerByte,
    /// `fee_per_unit * units`
    Fixed { units: u64 },
}

/// Validate `intent` for `account` and decide how it will be built.
///
/// Returns `Ok(None)` if `is_cancelled` fires before the decision is made.
pub async fn prepare_transaction(
    ctx: &WalkerContext,
    account: &Account,
    intent: &TransactionIntent,
    is_cancelled: &(dyn Fn() -> bool + Send + Sync),
) -> Result<Option<TransactionPlan>, HwLedgerError> {
    let currency = get_currency_by_id(&account.currency_id)?;
    let family = ctx.families().for_currency(currency)?;
    log::debug!(
        "Preparing {} transaction from {} to {}",
        family.name(),
        account.id,
        intent.recipient
    );
    family
        .prepare_transaction(ctx.provider(), currency, account, intent, is_cancelled)
        .await
}

/// Checks shared by every family builder
pub async fn plan_transfer(
    provider: &dyn AccountStateProvider,
    currency: &CryptoCurrency,
    account: &Account,
    intent: &TransactionIntent,
    is_cancelled: &(dyn Fn() -> bool + Send + Sync),
    fee_model: FeeModel,
) -> Result<Option<TransactionPlan>, HwLedgerError> {
    let valid = provider
        .is_address_valid(&currency.name.to_lowercase(), &intent.recipient)
        .await
        .map_err(remap_provider_error)?;
    if !valid {
        return Err(HwLedgerError::InvalidAddress {
            currency_name: currency.name.to_string(),
            address: intent.recipient.clone(),
        });
    }

    let fee_per_unit = match intent.fee_per_unit {
        Some(fee) if fee > 0 => fee,
        _ => return Err(HwLedgerError::FeeMissing),
    };

    if is_cancelled() {
        return Ok(None);
    }

    let estimated_fee = match fee_model {
        FeeModel::PerByte => None,
        FeeModel::Fixed { units } => Some(
            fee_per_unit
                .checked_mul(units)
                .ok_or(HwLedgerError::NotEnoughBalance)?,
        ),
    };
    let fee = estimated_fee.unwrap_or(0);

    let amount = if intent.use_all_amount {
        if account.balance <= fee {
            return Err(HwLedgerError::NotEnoughBalance);
        }
        TransferAmount::All
    } else {
        let amount = match intent.amount {
            Some(amount) if amount > 0 => amount,
            _ => return Err(HwLedgerError::AmountMissing),
        };
        if is_cancelled() {
            return Ok(None);
        }
        let total = amount.checked_add(fee).ok_or(HwLedgerError::NotEnoughBalance)?;
        if total > account.balance {
            return Err(HwLedgerError::NotEnoughBalance);
        }
        TransferAmount::Exact(amount)
    };

    Ok(Some(TransactionPlan {
        account_id: account.id.clone(),
        recipient: intent.recipient.clone(),
        amount,
        fee_per_unit,
        estimated_fee,
    }))
}
