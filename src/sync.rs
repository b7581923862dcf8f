//! Re-sync of an already known account
//!
//! Uses the identity stored in the account (no device needed), rebuilds the
//! snapshot through the provider and folds the fresh fields into the stored
//! account. Name and identity fields are never touched.

use chrono::Utc;

use crate::account::Account;
use crate::build_account::{build_account, AccountSource};
use crate::context::WalkerContext;
use crate::currency::get_currency_by_id;
use crate::error::HwLedgerError;
use crate::provider::fetch_snapshot;

/// Fold a freshly built snapshot into the stored account.
///
/// Refreshes everything that moves with the chain and clears pending
/// operations; keeps `name`, `index`, `seed_identifier` and the rest of the
/// identity from `initial`.
pub fn merge_synced(initial: &Account, synced: Account) -> Account {
    Account {
        id: synced.id,
        fresh_address: synced.fresh_address,
        fresh_address_path: synced.fresh_address_path,
        balance: synced.balance,
        block_height: synced.block_height,
        operations: synced.operations,
        sub_accounts: synced.sub_accounts,
        pending_operations: Vec::new(),
        last_sync_date: Utc::now(),
        ..initial.clone()
    }
}

/// Re-sync `existing` against the provider.
///
/// Provider failures come back remapped (`Sync`, `NotEnoughBalance`); an
/// uninterpretable operation fails the whole sync.
pub async fn sync_account(ctx: &WalkerContext, existing: &Account) -> Result<Account, HwLedgerError> {
    let parts = existing.id_parts()?;
    let currency = get_currency_by_id(&parts.currency_id)?;
    let family = ctx.families().for_currency(currency)?;

    let source = AccountSource {
        currency,
        derivation_mode: parts.derivation_mode,
        index: existing.index,
        seed_identifier: &existing.seed_identifier,
        xpub_or_address: &parts.xpub_or_address,
        xpub: existing.xpub.as_deref(),
    };
    let identity = source.provider_identity()?;
    log::info!("🔄 Syncing {} ({})", existing.name, identity.account_path);

    let snapshot = fetch_snapshot(ctx.provider(), &identity, &|| false)
        .await?
        .ok_or_else(|| HwLedgerError::sync("sync interrupted"))?;
    let synced = build_account(ctx.families(), &source, &snapshot, Some(existing))?;

    let merged = merge_synced(existing, synced);
    let patched = family.post_sync_patch(existing, merged);
    log::info!(
        "✅ {} synced: {} operations, balance {}",
        patched.name,
        patched.operations.len(),
        patched.balance
    );
    Ok(patched)
}
