//! Walker configuration from environment variables
//!
//! Controls which empty accounts are offered as new accounts, how many
//! trailing empty accounts each derivation mode probes, and where the local
//! account ledger lives.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::derivation::DerivationMode;

const DEFAULT_DATA_DIR: &str = "./accounts";

#[derive(Clone, Debug)]
pub struct WalkerConfig {
    /// Offer an empty legacy account even when the currency supports segwit
    pub show_legacy_new_account: bool,
    /// Per-mode override of the mandatory trailing empty account count
    pub empty_account_skip: HashMap<DerivationMode, u32>,
    /// Directory of the local account ledger
    pub data_dir: PathBuf,
}

impl WalkerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SHOW_LEGACY_NEW_ACCOUNT`: "1"/"true" to offer empty legacy accounts
    /// - `HWLEDGER_EMPTY_ACCOUNT_SKIP`: per-mode skip counts, e.g. `segwit=1,native_segwit=2`
    ///   (use `legacy` or `default` for the legacy mode)
    /// - `HWLEDGER_DATA_DIR`: account ledger directory (default `./accounts`)
    ///
    /// # Examples
    ///
    /// ```bash
    /// SHOW_LEGACY_NEW_ACCOUNT=1 HWLEDGER_EMPTY_ACCOUNT_SKIP=native_segwit=3 hwledger scan
    /// ```
    pub fn from_env() -> Self {
        let show_legacy_new_account = env::var("SHOW_LEGACY_NEW_ACCOUNT")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        if show_legacy_new_account {
            log::info!("🔧 Offering empty legacy accounts");
        }

        let empty_account_skip = env::var("HWLEDGER_EMPTY_ACCOUNT_SKIP")
            .map(|v| parse_skip_overrides(&v))
            .unwrap_or_default();
        for (mode, count) in &empty_account_skip {
            log::info!("🔧 Empty account skip for {}: {}", mode, count);
        }

        let data_dir = env::var("HWLEDGER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
        log::info!("📁 Account ledger: {}", data_dir.display());

        Self {
            show_legacy_new_account,
            empty_account_skip,
            data_dir,
        }
    }

    /// Consecutive empty accounts to probe for `mode` before the walker stops
    pub fn mandatory_empty_account_skip(&self, mode: DerivationMode) -> u32 {
        self.empty_account_skip
            .get(&mode)
            .copied()
            .unwrap_or_else(|| mode.mandatory_empty_account_skip())
    }
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            show_legacy_new_account: false,
            empty_account_skip: HashMap::new(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Parse `mode=count` pairs; malformed entries are logged and ignored
pub fn parse_skip_overrides(value: &str) -> HashMap<DerivationMode, u32> {
    let mut overrides = HashMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((mode, count)) = entry.split_once('=') else {
            log::warn!("⚠️  Ignoring empty account skip entry '{}'", entry);
            continue;
        };
        let mode = match mode.trim() {
            "legacy" | "default" => Ok(DerivationMode::Legacy),
            other => other.parse::<DerivationMode>(),
        };
        match (mode, count.trim().parse::<u32>()) {
            (Ok(mode), Ok(count)) => {
                overrides.insert(mode, count);
            }
            _ => log::warn!("⚠️  Ignoring empty account skip entry '{}'", entry),
        }
    }
    overrides
}
