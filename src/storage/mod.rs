//! Local account ledger
//!
//! - One JSON file per account, named after the hex-encoded account id
//! - Versioned envelope around the account record
//! - Accounts are added and updated, never deleted

mod file_system;
mod models;

pub use file_system::AccountStore;
pub use models::{StoredAccount, STORAGE_VERSION};
