//! On-disk record format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;

pub const STORAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAccount {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub account: Account,
}

impl StoredAccount {
    pub fn new(account: Account) -> Self {
        Self {
            version: STORAGE_VERSION,
            saved_at: Utc::now(),
            account,
        }
    }
}
