//! Common test utilities for hwledger integration tests
//!
//! This module provides shared test infrastructure including:
//! - A scripted device backed by a real BIP32 master key
//! - An in-memory account-state provider keyed by account path
//! - Raw operation and account fixtures

#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::NetworkKind;
use chrono::Utc;
use hwledger::{
    Account, AccountIdentity, AccountStateProvider, AddressOptions, DerivationMode, DeviceAddress,
    DeviceChannel, DeviceError, FreshAddress, ProviderError, RawOperation, RawOperationType,
    ScanCanceller, WalkerConfig, WalkerContext,
};
use serde_json::Value;

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

// ============================================================================
// Mock device
// ============================================================================

/// Device answering from a deterministic master key
///
/// Every request is recorded; errors can be scripted per path.
pub struct MockDevice {
    master: Xpriv,
    secp: Secp256k1<All>,
    calls: Arc<Mutex<Vec<String>>>,
    failures: HashMap<String, DeviceError>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            master: Xpriv::new_master(NetworkKind::Main, &[42u8; 32]).unwrap(),
            secp: Secp256k1::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: HashMap::new(),
        }
    }

    pub fn fail_at(mut self, path: &str, error: DeviceError) -> Self {
        self.failures.insert(path.to_string(), error);
        self
    }

    /// Shared log of requested paths, readable after the device moved into a scan
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    fn xpub(&self, path: &str) -> Xpub {
        let path = DerivationPath::from_str(&format!("m/{}", path)).unwrap();
        let xpriv = self.master.derive_priv(&self.secp, &path).unwrap();
        Xpub::from_priv(&self.secp, &xpriv)
    }

    /// Extended public key a correct walker must assemble for `path`
    pub fn expected_xpub(&self, path: &str) -> String {
        self.xpub(path).to_string()
    }

    pub fn public_key_hex(&self, path: &str) -> String {
        hex::encode(self.xpub(path).public_key.serialize_uncompressed())
    }

    pub fn address(&self, path: &str) -> String {
        let key = bitcoin::PublicKey::new(self.xpub(path).public_key);
        format!("addr:{}", key.pubkey_hash())
    }
}

#[async_trait]
impl DeviceChannel for MockDevice {
    async fn get_public_key_and_address(
        &mut self,
        path: &str,
        options: AddressOptions,
    ) -> Result<DeviceAddress, DeviceError> {
        self.calls.lock().unwrap().push(path.to_string());
        if let Some(err) = self.failures.get(path) {
            return Err(err.clone());
        }
        let xpub = self.xpub(path);
        Ok(DeviceAddress {
            public_key: hex::encode(xpub.public_key.serialize_uncompressed()),
            address: self.address(path),
            chain_code: options
                .ask_chain_code
                .then(|| hex::encode(&xpub.encode()[13..45])),
        })
    }
}

pub fn device_calls(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ============================================================================
// Mock provider
// ============================================================================

#[derive(Debug, Clone)]
pub struct MockAccount {
    pub balance: u64,
    pub operations: Vec<RawOperation>,
    pub fresh_address: FreshAddress,
}

impl MockAccount {
    pub fn with_operations(operations: Vec<RawOperation>) -> Self {
        Self {
            balance: operations.iter().map(|op| op.amount).sum(),
            operations,
            fresh_address: FreshAddress {
                address: "fresh-address".to_string(),
                path_suffix: "0/1".to_string(),
            },
        }
    }
}

/// Provider keyed by account root path; unknown paths are empty accounts
#[derive(Default)]
pub struct MockProvider {
    accounts: Mutex<HashMap<String, MockAccount>>,
    operation_requests: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, ProviderError>>,
    cancel_at: Mutex<Option<(String, ScanCanceller)>>,
    block_height: Mutex<u64>,
}

impl MockProvider {
    pub fn new() -> Self {
        let provider = Self::default();
        *provider.block_height.lock().unwrap() = 800_000;
        provider
    }

    pub fn set_account(&self, path: &str, account: MockAccount) {
        self.accounts
            .lock()
            .unwrap()
            .insert(path.to_string(), account);
    }

    pub fn set_operations(&self, path: &str, operations: Vec<RawOperation>) {
        self.set_account(path, MockAccount::with_operations(operations));
    }

    pub fn set_block_height(&self, height: u64) {
        *self.block_height.lock().unwrap() = height;
    }

    pub fn fail_at(&self, path: &str, error: ProviderError) {
        self.failures
            .lock()
            .unwrap()
            .insert(path.to_string(), error);
    }

    /// Cancel `canceller` when operations for `path` are requested
    pub fn cancel_at(&self, path: &str, canceller: ScanCanceller) {
        *self.cancel_at.lock().unwrap() = Some((path.to_string(), canceller));
    }

    /// Account paths whose operations were requested, in order
    pub fn operation_requests(&self) -> Vec<String> {
        self.operation_requests.lock().unwrap().clone()
    }

    fn account(&self, identity: &AccountIdentity) -> Result<MockAccount, ProviderError> {
        if let Some(err) = self.failures.lock().unwrap().get(&identity.account_path) {
            return Err(err.clone());
        }
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&identity.account_path)
            .cloned()
            .unwrap_or_else(|| MockAccount::with_operations(Vec::new())))
    }
}

#[async_trait]
impl AccountStateProvider for MockProvider {
    async fn get_balance(&self, identity: &AccountIdentity) -> Result<u64, ProviderError> {
        Ok(self.account(identity)?.balance)
    }

    async fn get_last_block_height(
        &self,
        _identity: &AccountIdentity,
    ) -> Result<u64, ProviderError> {
        Ok(*self.block_height.lock().unwrap())
    }

    async fn get_fresh_address(
        &self,
        identity: &AccountIdentity,
    ) -> Result<FreshAddress, ProviderError> {
        Ok(self.account(identity)?.fresh_address)
    }

    async fn get_operations(
        &self,
        identity: &AccountIdentity,
    ) -> Result<Vec<RawOperation>, ProviderError> {
        self.operation_requests
            .lock()
            .unwrap()
            .push(identity.account_path.clone());
        if let Some((path, canceller)) = self.cancel_at.lock().unwrap().as_ref() {
            if *path == identity.account_path {
                canceller.cancel();
            }
        }
        Ok(self.account(identity)?.operations)
    }

    async fn is_address_valid(
        &self,
        _currency_name: &str,
        address: &str,
    ) -> Result<bool, ProviderError> {
        Ok(!address.is_empty() && !address.starts_with("bad"))
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

pub fn context(provider: Arc<MockProvider>, config: WalkerConfig) -> WalkerContext {
    WalkerContext::new(provider, config)
}

pub fn config_with_skip(mode: DerivationMode, skip: u32) -> WalkerConfig {
    let mut config = WalkerConfig::default();
    config.empty_account_skip.insert(mode, skip);
    config
}

pub fn raw_op(hash: &str, kind: RawOperationType, amount: u64, secs: i64) -> RawOperation {
    RawOperation {
        operation_type: kind,
        transaction_hash: hash.to_string(),
        amount,
        fee: Some(100),
        senders: vec!["sender".to_string()],
        recipients: vec!["recipient".to_string()],
        block_height: Some(700_000),
        block_hash: None,
        date_epoch_ms: secs * 1000,
        payload: Value::Null,
    }
}

pub fn receive(hash: &str, amount: u64, secs: i64) -> RawOperation {
    raw_op(hash, RawOperationType::Receive, amount, secs)
}

/// Bare account for tests that do not go through a scan
pub fn account_fixture(id: &str, currency_id: &str, balance: u64) -> Account {
    Account {
        id: id.to_string(),
        seed_identifier: "04seed".to_string(),
        xpub: None,
        derivation_mode: DerivationMode::Legacy,
        index: 0,
        currency_id: currency_id.to_string(),
        fresh_address: "fresh-address".to_string(),
        fresh_address_path: "44'/0'/0'/0/0".to_string(),
        name: "Fixture 1".to_string(),
        balance,
        block_height: 1,
        operations: Vec::new(),
        pending_operations: Vec::new(),
        sub_accounts: Vec::new(),
        last_sync_date: Utc::now(),
    }
}
