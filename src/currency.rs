//! Static table of supported currencies
//!
//! Each currency names its family (which selects the operation interpreter
//! and transaction builder), its BIP44 coin type, and the capabilities that
//! decide which derivation modes are scanned.

use bitcoin::NetworkKind;

use crate::derivation::DerivationMode;
use crate::error::HwLedgerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoCurrency {
    pub id: &'static str,
    pub name: &'static str,
    pub ticker: &'static str,
    /// Family tag, the key of the family registry
    pub family: &'static str,
    /// BIP44 coin type
    pub coin_type: u32,
    /// Currency this one was forked from (enables the unsplit modes)
    pub forked_from: Option<&'static str>,
    pub supports_segwit: bool,
    pub supports_native_segwit: bool,
    /// Extra derivation modes inherited from older wallets for this currency
    pub legacy_derivations: &'static [DerivationMode],
    /// Network kind used when serialising extended public keys
    pub key_network: NetworkKind,
}

pub const BITCOIN: CryptoCurrency = CryptoCurrency {
    id: "bitcoin",
    name: "Bitcoin",
    ticker: "BTC",
    family: "bitcoin",
    coin_type: 0,
    forked_from: None,
    supports_segwit: true,
    supports_native_segwit: true,
    legacy_derivations: &[],
    key_network: NetworkKind::Main,
};

pub const BITCOIN_TESTNET: CryptoCurrency = CryptoCurrency {
    id: "bitcoin_testnet",
    name: "Bitcoin Testnet",
    ticker: "tBTC",
    family: "bitcoin",
    coin_type: 1,
    forked_from: None,
    supports_segwit: true,
    supports_native_segwit: true,
    legacy_derivations: &[],
    key_network: NetworkKind::Test,
};

pub const BITCOIN_CASH: CryptoCurrency = CryptoCurrency {
    id: "bitcoin_cash",
    name: "Bitcoin Cash",
    ticker: "BCH",
    family: "bitcoin",
    coin_type: 145,
    forked_from: Some("bitcoin"),
    supports_segwit: false,
    supports_native_segwit: false,
    legacy_derivations: &[],
    key_network: NetworkKind::Main,
};

pub const BITCOIN_GOLD: CryptoCurrency = CryptoCurrency {
    id: "bitcoin_gold",
    name: "Bitcoin Gold",
    ticker: "BTG",
    family: "bitcoin",
    coin_type: 156,
    forked_from: Some("bitcoin"),
    supports_segwit: true,
    supports_native_segwit: false,
    legacy_derivations: &[],
    key_network: NetworkKind::Main,
};

pub const LITECOIN: CryptoCurrency = CryptoCurrency {
    id: "litecoin",
    name: "Litecoin",
    ticker: "LTC",
    family: "bitcoin",
    coin_type: 2,
    forked_from: None,
    supports_segwit: true,
    supports_native_segwit: true,
    legacy_derivations: &[],
    key_network: NetworkKind::Main,
};

pub const DOGECOIN: CryptoCurrency = CryptoCurrency {
    id: "dogecoin",
    name: "Dogecoin",
    ticker: "DOGE",
    family: "bitcoin",
    coin_type: 3,
    forked_from: None,
    supports_segwit: false,
    supports_native_segwit: false,
    legacy_derivations: &[],
    key_network: NetworkKind::Main,
};

pub const VERTCOIN: CryptoCurrency = CryptoCurrency {
    id: "vertcoin",
    name: "Vertcoin",
    ticker: "VTC",
    family: "bitcoin",
    coin_type: 28,
    forked_from: None,
    supports_segwit: true,
    supports_native_segwit: true,
    legacy_derivations: &[DerivationMode::Vertcoin128, DerivationMode::Vertcoin128Segwit],
    key_network: NetworkKind::Main,
};

pub const ETHEREUM: CryptoCurrency = CryptoCurrency {
    id: "ethereum",
    name: "Ethereum",
    ticker: "ETH",
    family: "ethereum",
    coin_type: 60,
    forked_from: None,
    supports_segwit: false,
    supports_native_segwit: false,
    legacy_derivations: &[DerivationMode::EthM, DerivationMode::EthMM],
    key_network: NetworkKind::Main,
};

pub const RIPPLE: CryptoCurrency = CryptoCurrency {
    id: "ripple",
    name: "XRP",
    ticker: "XRP",
    family: "ripple",
    coin_type: 144,
    forked_from: None,
    supports_segwit: false,
    supports_native_segwit: false,
    legacy_derivations: &[DerivationMode::Rip, DerivationMode::RipL],
    key_network: NetworkKind::Main,
};

static CURRENCIES: &[CryptoCurrency] = &[
    BITCOIN,
    BITCOIN_TESTNET,
    BITCOIN_CASH,
    BITCOIN_GOLD,
    LITECOIN,
    DOGECOIN,
    VERTCOIN,
    ETHEREUM,
    RIPPLE,
];

/// All currencies known to this crate
pub fn list_currencies() -> &'static [CryptoCurrency] {
    CURRENCIES
}

pub fn find_currency_by_id(id: &str) -> Option<&'static CryptoCurrency> {
    CURRENCIES.iter().find(|c| c.id == id)
}

pub fn get_currency_by_id(id: &str) -> Result<&'static CryptoCurrency, HwLedgerError> {
    find_currency_by_id(id).ok_or_else(|| HwLedgerError::UnknownCurrency(id.to_string()))
}
