use std::fs;
use std::path::PathBuf;

use bitcoin::hashes::{sha256, Hash};

use super::models::{StoredAccount, STORAGE_VERSION};
use crate::account::Account;
use crate::config::WalkerConfig;
use crate::error::StorageError;
use crate::reconciliation::merge_operations;
use crate::sync::merge_synced;

#[derive(Clone, Debug)]
pub struct AccountStore {
    base_path: PathBuf,
}

impl AccountStore {
    /// Store rooted at the configured data directory
    pub fn new(config: &WalkerConfig) -> Self {
        Self {
            base_path: config.data_dir.clone(),
        }
    }

    /// Create a store with a custom base directory (for testing)
    pub fn new_with_base_dir(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_path
    }

    /// Account ids embed an xpub and can exceed file name limits, so files
    /// are named by the SHA-256 of the id; the id itself lives in the record.
    pub fn account_file(&self, account_id: &str) -> PathBuf {
        let digest = sha256::Hash::hash(account_id.as_bytes());
        self.base_path.join(format!("{}.json", digest))
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.account_file(account_id).exists()
    }

    /// Write the account, replacing any previous record with the same id
    pub fn save(&self, account: &Account) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.account_file(&account.id);
        let json = serde_json::to_string_pretty(&StoredAccount::new(account.clone()))?;
        fs::write(&path, json)?;
        log::debug!("Saved {} to {}", account.id, path.display());
        Ok(())
    }

    pub fn load(&self, account_id: &str) -> Result<Account, StorageError> {
        let path = self.account_file(account_id);
        if !path.exists() {
            return Err(StorageError::AccountNotFound(account_id.to_string()));
        }
        let contents = fs::read_to_string(&path)?;
        let stored: StoredAccount = serde_json::from_str(&contents)?;
        if stored.account.id != account_id {
            log::warn!(
                "⚠️  {} holds {}, not {}",
                path.display(),
                stored.account.id,
                account_id
            );
            return Err(StorageError::AccountNotFound(account_id.to_string()));
        }
        if stored.version != STORAGE_VERSION {
            log::warn!(
                "⚠️  Account {} was stored with format version {}",
                account_id,
                stored.version
            );
        }
        Ok(stored.account)
    }

    /// All stored accounts, ordered by currency, derivation mode and index
    pub fn list(&self) -> Result<Vec<Account>, StorageError> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut accounts = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str::<StoredAccount>(&contents) {
                Ok(stored) => accounts.push(stored.account),
                Err(e) => log::warn!("⚠️  Skipping unreadable {}: {}", path.display(), e),
            }
        }
        accounts.sort_by(|a, b| {
            (&a.currency_id, a.derivation_mode, a.index).cmp(&(&b.currency_id, b.derivation_mode, b.index))
        });
        Ok(accounts)
    }

    /// Stored accounts of one currency
    pub fn list_for_currency(&self, currency_id: &str) -> Result<Vec<Account>, StorageError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| a.currency_id == currency_id)
            .collect())
    }

    /// Persist a freshly scanned account.
    ///
    /// A known account keeps its stored name and identity and takes the
    /// scanned chain state. Its stored operations are reconciled with the
    /// scanned ones, so history the provider no longer returns is kept. An
    /// unknown account is stored as scanned.
    pub fn upsert_scanned(&self, scanned: Account) -> Result<Account, StorageError> {
        let account = if self.contains(&scanned.id) {
            let stored = self.load(&scanned.id)?;
            log::info!("Updating stored account {}", stored.name);
            let operations = merge_operations(&stored.operations, &scanned.operations);
            Account {
                operations,
                ..merge_synced(&stored, scanned)
            }
        } else {
            log::info!("📒 Storing new account {}", scanned.name);
            scanned
        };
        self.save(&account)?;
        Ok(account)
    }
}
