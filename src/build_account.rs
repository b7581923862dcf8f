//! Account snapshot builder
//!
//! Assembles a complete [`Account`] from provider answers, the family's
//! operation interpreter and the reconciler. The previous account, when
//! given, is only read: a new value is always returned and persisting it is
//! the caller's decision.

use chrono::Utc;

use crate::account::{
    encode_account_id, get_account_placeholder_name, get_new_account_placeholder_name, Account,
    AccountIdParts,
};
use crate::currency::CryptoCurrency;
use crate::derivation::{resolve_scheme, DerivationMode, SchemeParams};
use crate::error::HwLedgerError;
use crate::families::FamilyRegistry;
use crate::operation::build_operation;
use crate::provider::{AccountIdentity, FreshAddress, ProviderSnapshot};
use crate::reconciliation::reconcile_operations;

/// Immutable identity of the account being built
#[derive(Debug, Clone, Copy)]
pub struct AccountSource<'a> {
    pub currency: &'a CryptoCurrency,
    pub derivation_mode: DerivationMode,
    pub index: u32,
    pub seed_identifier: &'a str,
    /// Extended public key, or address for address-keyed families
    pub xpub_or_address: &'a str,
    pub xpub: Option<&'a str>,
}

impl AccountSource<'_> {
    pub fn account_id(&self) -> String {
        encode_account_id(&AccountIdParts {
            currency_id: self.currency.id.to_string(),
            xpub_or_address: self.xpub_or_address.to_string(),
            derivation_mode: self.derivation_mode,
        })
    }

    /// Identity handed to the account-state provider
    pub fn provider_identity(&self) -> Result<AccountIdentity, HwLedgerError> {
        Ok(AccountIdentity {
            currency_id: self.currency.id.to_string(),
            currency_name: self.currency.name.to_string(),
            xpub_or_address: self.xpub_or_address.to_string(),
            derivation_mode: self.derivation_mode,
            keychain_engine: self.derivation_mode.keychain_engine(),
            account_path: account_root_path(self.currency, self.derivation_mode, self.index)?,
            index: self.index,
        })
    }
}

/// Path of the account node, e.g. `84'/0'/1'`
pub fn account_root_path(
    currency: &CryptoCurrency,
    mode: DerivationMode,
    index: u32,
) -> Result<String, HwLedgerError> {
    let scheme = resolve_scheme(currency, mode)?;
    Ok(scheme
        .truncate_after_account()
        .instantiate(&SchemeParams::new(currency.coin_type).with_account(index)))
}

/// Derivation path of the provider's fresh address.
///
/// A relative suffix is appended to the account root; a suffix that is
/// already fully qualified is kept as is.
pub fn resolve_fresh_address_path(
    account_id: &str,
    account_root: &str,
    fresh: &FreshAddress,
) -> Result<String, HwLedgerError> {
    if fresh.address.is_empty() {
        return Err(HwLedgerError::FreshAddressUnavailable(account_id.to_string()));
    }

    let suffix = fresh.path_suffix.trim().trim_matches('/');
    if suffix.is_empty() {
        return Ok(account_root.to_string());
    }
    if let Some(absolute) = suffix.strip_prefix("m/") {
        return Ok(absolute.to_string());
    }
    if suffix == account_root || suffix.starts_with(&format!("{}/", account_root)) {
        return Ok(suffix.to_string());
    }
    Ok(format!("{}/{}", account_root, suffix))
}

/// Build the account snapshot for `source` from provider data.
pub fn build_account(
    families: &FamilyRegistry,
    source: &AccountSource<'_>,
    snapshot: &ProviderSnapshot,
    existing: Option<&Account>,
) -> Result<Account, HwLedgerError> {
    let family = families.for_currency(source.currency)?;
    let id = source.account_id();
    let account_root = account_root_path(source.currency, source.derivation_mode, source.index)?;
    let fresh_address_path = resolve_fresh_address_path(&id, &account_root, &snapshot.fresh_address)?;

    let existing_subs = existing.map(|a| a.sub_accounts.as_slice()).unwrap_or_default();
    let sub_accounts = family
        .build_sub_accounts(&id, &snapshot.raw_operations, existing_subs)
        .map_err(into_sync_error)?;

    let previous_ops = existing.map(|a| a.operations.as_slice()).unwrap_or_default();
    let operations = reconcile_operations(previous_ops, &snapshot.raw_operations, |raw| {
        build_operation(raw, &id, &**family)
    })
    .map_err(into_sync_error)?;

    let name = if operations.is_empty() {
        get_new_account_placeholder_name(source.currency, source.index, source.derivation_mode)
    } else {
        get_account_placeholder_name(source.currency, source.index, source.derivation_mode)
    };

    Ok(Account {
        id,
        seed_identifier: source.seed_identifier.to_string(),
        xpub: source.xpub.map(str::to_string),
        derivation_mode: source.derivation_mode,
        index: source.index,
        currency_id: source.currency.id.to_string(),
        fresh_address: snapshot.fresh_address.address.clone(),
        fresh_address_path,
        name,
        balance: snapshot.balance,
        block_height: snapshot.block_height,
        operations,
        pending_operations: Vec::new(),
        sub_accounts,
        last_sync_date: Utc::now(),
    })
}

/// An uninterpretable record fails the whole sync
fn into_sync_error(err: HwLedgerError) -> HwLedgerError {
    match err {
        HwLedgerError::InvalidOperation(reason) => HwLedgerError::Sync(reason),
        other => other,
    }
}
