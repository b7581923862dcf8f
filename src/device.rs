//! Hardware device boundary
//!
//! The device is a single-owner sequential resource: callers hold it by
//! `&mut` and never issue overlapping requests. Only the public key request
//! is needed for discovery. APDU framing and USB/BLE transport live behind
//! [`DeviceChannel`] implementations.

use async_trait::async_trait;
use bitcoin::bip32::{DerivationPath, Xpub};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::PublicKey;
use bitcoin::NetworkKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::derivation::{AddressFormat, DerivationMode};
use crate::error::HwLedgerError;

/// Status returned by older device apps that predate segwit derivation
pub const STATUS_UNSUPPORTED_SEGWIT: u16 = 0x6f04;

const XPUB_VERSION_MAIN: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];
const XPUB_VERSION_TEST: [u8; 4] = [0x04, 0x35, 0x87, 0xcf];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device returned status 0x{status_code:04x}: {message}")]
    Status { status_code: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl DeviceError {
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status_code,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status_code, .. } => Some(*status_code),
            Self::Transport(_) => None,
        }
    }

    /// Whether the device app simply does not know this derivation mode
    pub fn is_unsupported_mode(&self, mode: DerivationMode) -> bool {
        mode == DerivationMode::Segwit && self.status_code() == Some(STATUS_UNSUPPORTED_SEGWIT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressOptions {
    pub ask_chain_code: bool,
    pub verify: bool,
    pub format: AddressFormat,
}

impl AddressOptions {
    pub fn for_mode(mode: DerivationMode) -> Self {
        Self {
            ask_chain_code: false,
            verify: false,
            format: mode.address_format(),
        }
    }

    pub fn with_chain_code(mut self) -> Self {
        self.ask_chain_code = true;
        self
    }
}

/// Device answer for one path; keys and chain code are hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub public_key: String,
    pub address: String,
    pub chain_code: Option<String>,
}

#[async_trait]
pub trait DeviceChannel: Send {
    /// `path` is rendered without the `m/` prefix, e.g. `84'/0'/1'`
    async fn get_public_key_and_address(
        &mut self,
        path: &str,
        options: AddressOptions,
    ) -> Result<DeviceAddress, DeviceError>;

    /// Release the transport once a walk is over
    async fn close(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

fn parse_public_key(hex_key: &str) -> Result<PublicKey, HwLedgerError> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| HwLedgerError::InvalidPublicKey(format!("bad hex: {}", e)))?;
    PublicKey::from_slice(&bytes).map_err(|e| HwLedgerError::InvalidPublicKey(e.to_string()))
}

/// Fingerprint of a key as used in BIP32 serialisation
pub fn key_fingerprint(public_key_hex: &str) -> Result<[u8; 4], HwLedgerError> {
    let key = parse_public_key(public_key_hex)?;
    let id = hash160::Hash::hash(&key.serialize()).to_byte_array();
    Ok([id[0], id[1], id[2], id[3]])
}

/// Assemble the account extended public key from device answers.
///
/// `account` is the device answer at `account_path` (requested with a chain
/// code) and `parent_public_key` the key at the path one level up.
pub fn assemble_xpub(
    network: NetworkKind,
    account_path: &DerivationPath,
    parent_public_key: &str,
    account: &DeviceAddress,
) -> Result<Xpub, HwLedgerError> {
    let child_number = account_path
        .into_iter()
        .last()
        .copied()
        .ok_or_else(|| HwLedgerError::InvalidDerivationPath(account_path.to_string()))?;
    let depth = u8::try_from(account_path.len())
        .map_err(|_| HwLedgerError::InvalidDerivationPath(account_path.to_string()))?;

    let chain_code_hex = account.chain_code.as_deref().ok_or_else(|| {
        HwLedgerError::InvalidPublicKey(format!("no chain code returned for {}", account_path))
    })?;
    let chain_code = hex::decode(chain_code_hex)
        .map_err(|e| HwLedgerError::InvalidPublicKey(format!("bad chain code: {}", e)))?;
    if chain_code.len() != 32 {
        return Err(HwLedgerError::InvalidPublicKey(format!(
            "chain code is {} bytes",
            chain_code.len()
        )));
    }

    let key = parse_public_key(&account.public_key)?;
    let fingerprint = key_fingerprint(parent_public_key)?;

    let mut data = Vec::with_capacity(78);
    data.extend_from_slice(match network {
        NetworkKind::Main => &XPUB_VERSION_MAIN,
        NetworkKind::Test => &XPUB_VERSION_TEST,
    });
    data.push(depth);
    data.extend_from_slice(&fingerprint);
    data.extend_from_slice(&u32::from(child_number).to_be_bytes());
    data.extend_from_slice(&chain_code);
    data.extend_from_slice(&key.serialize());

    Xpub::decode(&data).map_err(|e| HwLedgerError::InvalidPublicKey(e.to_string()))
}
