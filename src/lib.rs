//! hwledger: hardware-wallet account discovery and ledger sync
//!
//! This crate finds the accounts a hardware signing device holds for a
//! currency, numbers them, and keeps their operation history consistent with
//! what an external account-state provider reports.
//!
//! # Architecture
//!
//! - **Derivation**: derivation modes and path schemes per currency
//! - **Account identity**: stable account ids, the join key between a fresh
//!   snapshot and a stored account
//! - **Reconciliation**: left-biased incremental merge of fresh operations
//!   into a known history
//! - **Snapshot builder**: assembles an account from provider answers
//! - **Discovery walker**: cancellable scan over modes and account indices
//!   that streams accounts as they are confirmed
//!
//! The device transport and the provider wire protocol stay behind the
//! [`DeviceChannel`] and [`AccountStateProvider`] traits.
//!
//! # Example
//!
//! ```ignore
//! use hwledger::{scan_accounts_on_device, AccountStore, ScanRequest, WalkerConfig, WalkerContext};
//!
//! let config = WalkerConfig::from_env();
//! let store = AccountStore::new(&config);
//! let ctx = WalkerContext::new(provider, config);
//!
//! let request = ScanRequest::new(&hwledger::currency::BITCOIN)
//!     .with_existing_accounts(store.list_for_currency("bitcoin")?);
//! let summary = scan_accounts_on_device(&ctx, device, request).collect().await;
//! for account in summary.into_result()? {
//!     store.upsert_scanned(account)?;
//! }
//! ```

// Public modules
pub mod account;
pub mod build_account;
pub mod config;
pub mod context;
pub mod currency;
pub mod derivation;
pub mod device;
pub mod error;
pub mod families;
pub mod operation;
pub mod provider;
pub mod reconciliation;
pub mod scan;
pub mod storage;
pub mod sync;
pub mod transaction;

// Re-exports for convenience
pub use account::{decode_account_id, encode_account_id, Account, AccountIdParts, SubAccount};
pub use build_account::{build_account, AccountSource};
pub use config::WalkerConfig;
pub use context::WalkerContext;
pub use currency::{get_currency_by_id, CryptoCurrency};
pub use derivation::{resolve_scheme, DerivationMode, DerivationScheme, SchemeParams};
pub use device::{AddressOptions, DeviceAddress, DeviceChannel, DeviceError};
pub use error::{remap_provider_error, HwLedgerError, StorageError};
pub use families::{CurrencyFamily, FamilyRegistry};
pub use operation::{Operation, OperationType, RawOperation, RawOperationType};
pub use provider::{
    AccountIdentity, AccountStateProvider, FreshAddress, ProviderError, ProviderErrorCode,
};
pub use reconciliation::{merge_operations, reconcile_operations};
pub use scan::{
    scan_accounts_on_device, scan_accounts_with_canceller, ScanCanceller, ScanEvent, ScanHandle,
    ScanRequest, ScanState, ScanSummary,
};
pub use storage::AccountStore;
pub use sync::sync_account;
pub use transaction::{prepare_transaction, TransactionIntent, TransactionPlan, TransferAmount};

// Common result type
pub type Result<T> = std::result::Result<T, HwLedgerError>;
