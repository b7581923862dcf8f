//! Account records and identity
//!
//! An account id is a pure function of the currency, the account's extended
//! public key (or address, for address-keyed families) and the derivation
//! mode. It is the join key used to reattach a fresh snapshot to a stored
//! account, so its format never changes once written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WalkerConfig;
use crate::currency::CryptoCurrency;
use crate::derivation::{derivation_modes_for_currency, DerivationMode};
use crate::error::HwLedgerError;
use crate::operation::Operation;

/// Identity scheme tag, first field of every account id
pub const ACCOUNT_ID_TYPE: &str = "walker-v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdParts {
    pub currency_id: String,
    pub xpub_or_address: String,
    pub derivation_mode: DerivationMode,
}

/// `walker-v1:{currency}:{xpub_or_address}:{mode}`
pub fn encode_account_id(parts: &AccountIdParts) -> String {
    format!(
        "{}:{}:{}:{}",
        ACCOUNT_ID_TYPE,
        parts.currency_id,
        parts.xpub_or_address,
        parts.derivation_mode.as_str()
    )
}

pub fn decode_account_id(id: &str) -> Result<AccountIdParts, HwLedgerError> {
    let invalid = || HwLedgerError::InvalidAccountId(id.to_string());

    let mut head = id.splitn(3, ':');
    let kind = head.next().ok_or_else(invalid)?;
    let currency_id = head.next().ok_or_else(invalid)?;
    let rest = head.next().ok_or_else(invalid)?;
    if kind != ACCOUNT_ID_TYPE || currency_id.is_empty() {
        return Err(invalid());
    }

    // the middle field may itself contain ':'
    let (xpub_or_address, mode) = rest.rsplit_once(':').ok_or_else(invalid)?;
    if xpub_or_address.is_empty() {
        return Err(invalid());
    }
    let derivation_mode = mode.parse().map_err(|_| invalid())?;

    Ok(AccountIdParts {
        currency_id: currency_id.to_string(),
        xpub_or_address: xpub_or_address.to_string(),
        derivation_mode,
    })
}

/// Token account nested under a parent account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAccount {
    /// `{parent_id}+{token_id}`
    pub id: String,
    pub parent_id: String,
    pub token_id: String,
    pub balance: u64,
    pub operations: Vec<Arc<Operation>>,
}

impl SubAccount {
    pub fn make_id(parent_id: &str, token_id: &str) -> String {
        format!("{}+{}", parent_id, token_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Public key identifying the device seed the account was found on
    pub seed_identifier: String,
    /// Extended public key, absent for address-keyed families
    pub xpub: Option<String>,
    pub derivation_mode: DerivationMode,
    pub index: u32,
    pub currency_id: String,
    pub fresh_address: String,
    pub fresh_address_path: String,
    pub name: String,
    pub balance: u64,
    pub block_height: u64,
    /// Newest first
    pub operations: Vec<Arc<Operation>>,
    pub pending_operations: Vec<Arc<Operation>>,
    #[serde(default)]
    pub sub_accounts: Vec<SubAccount>,
    pub last_sync_date: DateTime<Utc>,
}

impl Account {
    pub fn id_parts(&self) -> Result<AccountIdParts, HwLedgerError> {
        decode_account_id(&self.id)
    }
}

/// An account with no observed operations
pub fn is_account_empty(account: &Account) -> bool {
    account.operations.is_empty()
}

fn tag_suffix(mode: DerivationMode) -> String {
    match mode.tag() {
        Some(tag) => format!(" ({})", tag),
        None => String::new(),
    }
}

pub fn get_account_placeholder_name(
    currency: &CryptoCurrency,
    index: u32,
    mode: DerivationMode,
) -> String {
    format!("{} {}{}", currency.name, index + 1, tag_suffix(mode))
}

pub fn get_new_account_placeholder_name(
    currency: &CryptoCurrency,
    index: u32,
    mode: DerivationMode,
) -> String {
    format!("New {} account {}{}", currency.name, index + 1, tag_suffix(mode))
}

/// Whether an empty slot of this mode is offered to the user as a new account
pub fn should_show_new_account(
    currency: &CryptoCurrency,
    mode: DerivationMode,
    config: &WalkerConfig,
) -> bool {
    let modes = derivation_modes_for_currency(currency);
    if modes.last() == Some(&mode) {
        return true;
    }
    match mode {
        DerivationMode::Legacy => config.show_legacy_new_account || !currency.supports_segwit,
        DerivationMode::Segwit => true,
        _ => false,
    }
}
