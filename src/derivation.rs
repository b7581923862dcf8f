//! Derivation modes and path schemes
//!
//! A [`DerivationMode`] names a strategy for deriving account keys (legacy
//! BIP44, segwit BIP49, native segwit BIP84, fork-unsplit variants and a few
//! paths inherited from older wallets). [`resolve_scheme`] turns a currency and
//! a mode into a templated [`DerivationScheme`] such as
//! `84'/<coin_type>'/<account>'/<node>/<address>`, which can be cut around the
//! account segment and instantiated into a concrete path string.
//!
//! Everything here is pure and shared freely between concurrent scans.

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::DerivationPath;
use serde::{Deserialize, Serialize};

use crate::currency::{get_currency_by_id, CryptoCurrency};
use crate::error::HwLedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DerivationMode {
    /// Default BIP44 derivation, tagged with the empty string
    #[serde(rename = "")]
    Legacy,
    #[serde(rename = "segwit")]
    Segwit,
    #[serde(rename = "native_segwit")]
    NativeSegwit,
    #[serde(rename = "unsplit")]
    Unsplit,
    #[serde(rename = "segwit_unsplit")]
    SegwitUnsplit,
    #[serde(rename = "vertcoin_128")]
    Vertcoin128,
    #[serde(rename = "vertcoin_128_segwit")]
    Vertcoin128Segwit,
    #[serde(rename = "ethM")]
    EthM,
    #[serde(rename = "ethMM")]
    EthMM,
    #[serde(rename = "rip")]
    Rip,
    #[serde(rename = "ripL")]
    RipL,
}

/// Address encoding requested from the device for a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFormat {
    Legacy,
    P2sh,
    Bech32,
}

/// Keychain engine the account-state provider uses to derive addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeychainEngine {
    #[serde(rename = "BIP32_P2PKH")]
    Bip32P2pkh,
    #[serde(rename = "BIP49_P2SH")]
    Bip49P2sh,
    #[serde(rename = "BIP173_P2WPKH")]
    Bip173P2wpkh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProperties {
    pub purpose: u32,
    pub address_format: AddressFormat,
    pub keychain_engine: KeychainEngine,
    pub tag: Option<&'static str>,
    pub is_segwit: bool,
    pub is_unsplit: bool,
    /// At most one account lives under this mode
    pub is_non_iterable: bool,
    /// First account index that is valid for this mode
    pub starts_at: u32,
    /// Consecutive empty accounts to probe before giving up on the mode
    pub mandatory_empty_account_skip: u32,
    /// Full path template replacing the purpose-based one
    pub overrides_derivation: Option<&'static str>,
    pub coin_type_override: Option<u32>,
}

const BASE: ModeProperties = ModeProperties {
    purpose: 44,
    address_format: AddressFormat::Legacy,
    keychain_engine: KeychainEngine::Bip32P2pkh,
    tag: None,
    is_segwit: false,
    is_unsplit: false,
    is_non_iterable: false,
    starts_at: 0,
    mandatory_empty_account_skip: 0,
    overrides_derivation: None,
    coin_type_override: None,
};

const LEGACY: ModeProperties = BASE;

const SEGWIT: ModeProperties = ModeProperties {
    purpose: 49,
    address_format: AddressFormat::P2sh,
    keychain_engine: KeychainEngine::Bip49P2sh,
    tag: Some("segwit"),
    is_segwit: true,
    ..BASE
};

const NATIVE_SEGWIT: ModeProperties = ModeProperties {
    purpose: 84,
    address_format: AddressFormat::Bech32,
    keychain_engine: KeychainEngine::Bip173P2wpkh,
    tag: Some("native segwit"),
    is_segwit: true,
    ..BASE
};

const UNSPLIT: ModeProperties = ModeProperties {
    tag: Some("unsplit"),
    is_unsplit: true,
    ..BASE
};

const SEGWIT_UNSPLIT: ModeProperties = ModeProperties {
    tag: Some("segwit unsplit"),
    is_unsplit: true,
    ..SEGWIT
};

const VERTCOIN_128: ModeProperties = ModeProperties {
    tag: Some("legacy"),
    coin_type_override: Some(128),
    ..BASE
};

const VERTCOIN_128_SEGWIT: ModeProperties = ModeProperties {
    tag: Some("legacy segwit"),
    coin_type_override: Some(128),
    ..SEGWIT
};

const ETH_M: ModeProperties = ModeProperties {
    tag: Some("legacy"),
    mandatory_empty_account_skip: 10,
    overrides_derivation: Some("44'/60'/0'/<account>"),
    ..BASE
};

const ETH_MM: ModeProperties = ModeProperties {
    tag: Some("metamask"),
    mandatory_empty_account_skip: 10,
    overrides_derivation: Some("44'/60'/0'/0/<account>"),
    ..BASE
};

const RIP: ModeProperties = ModeProperties {
    tag: Some("legacy"),
    is_non_iterable: true,
    overrides_derivation: Some("44'/144'/0'/0'"),
    ..BASE
};

const RIP_L: ModeProperties = ModeProperties {
    tag: Some("legacy"),
    overrides_derivation: Some("44'/144'/0'/0'/<account>"),
    ..BASE
};

impl DerivationMode {
    pub const ALL: [DerivationMode; 11] = [
        DerivationMode::Legacy,
        DerivationMode::Segwit,
        DerivationMode::NativeSegwit,
        DerivationMode::Unsplit,
        DerivationMode::SegwitUnsplit,
        DerivationMode::Vertcoin128,
        DerivationMode::Vertcoin128Segwit,
        DerivationMode::EthM,
        DerivationMode::EthMM,
        DerivationMode::Rip,
        DerivationMode::RipL,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "",
            Self::Segwit => "segwit",
            Self::NativeSegwit => "native_segwit",
            Self::Unsplit => "unsplit",
            Self::SegwitUnsplit => "segwit_unsplit",
            Self::Vertcoin128 => "vertcoin_128",
            Self::Vertcoin128Segwit => "vertcoin_128_segwit",
            Self::EthM => "ethM",
            Self::EthMM => "ethMM",
            Self::Rip => "rip",
            Self::RipL => "ripL",
        }
    }

    pub fn properties(&self) -> &'static ModeProperties {
        match self {
            Self::Legacy => &LEGACY,
            Self::Segwit => &SEGWIT,
            Self::NativeSegwit => &NATIVE_SEGWIT,
            Self::Unsplit => &UNSPLIT,
            Self::SegwitUnsplit => &SEGWIT_UNSPLIT,
            Self::Vertcoin128 => &VERTCOIN_128,
            Self::Vertcoin128Segwit => &VERTCOIN_128_SEGWIT,
            Self::EthM => &ETH_M,
            Self::EthMM => &ETH_MM,
            Self::Rip => &RIP,
            Self::RipL => &RIP_L,
        }
    }

    pub fn is_iterable(&self) -> bool {
        !self.properties().is_non_iterable
    }

    pub fn supports_index(&self, index: u32) -> bool {
        let props = self.properties();
        if props.is_non_iterable && index != 0 {
            return false;
        }
        index >= props.starts_at
    }

    pub fn mandatory_empty_account_skip(&self) -> u32 {
        self.properties().mandatory_empty_account_skip
    }

    pub fn purpose(&self) -> u32 {
        self.properties().purpose
    }

    pub fn tag(&self) -> Option<&'static str> {
        self.properties().tag
    }

    pub fn is_unsplit(&self) -> bool {
        self.properties().is_unsplit
    }

    pub fn keychain_engine(&self) -> KeychainEngine {
        self.properties().keychain_engine
    }

    pub fn address_format(&self) -> AddressFormat {
        self.properties().address_format
    }
}

impl fmt::Display for DerivationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "default"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl FromStr for DerivationMode {
    type Err = HwLedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| HwLedgerError::unsupported_mode("any currency", s))
    }
}

/// Derivation modes to scan for a currency, in scan order
pub fn derivation_modes_for_currency(currency: &CryptoCurrency) -> Vec<DerivationMode> {
    let mut modes = Vec::new();
    if currency.forked_from.is_some() {
        modes.push(DerivationMode::Unsplit);
        if currency.supports_segwit {
            modes.push(DerivationMode::SegwitUnsplit);
        }
    }
    modes.extend_from_slice(currency.legacy_derivations);
    modes.push(DerivationMode::Legacy);
    if currency.supports_segwit {
        modes.push(DerivationMode::Segwit);
    }
    if currency.supports_native_segwit {
        modes.push(DerivationMode::NativeSegwit);
    }
    modes
}

/// One segment of a path template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeSegment {
    Index { value: u32, hardened: bool },
    CoinType { hardened: bool },
    Account { hardened: bool },
    Node,
    Address,
}

impl fmt::Display for SchemeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (body, hardened) = match self {
            Self::Index { value, hardened } => (value.to_string(), *hardened),
            Self::CoinType { hardened } => ("<coin_type>".to_string(), *hardened),
            Self::Account { hardened } => ("<account>".to_string(), *hardened),
            Self::Node => ("<node>".to_string(), false),
            Self::Address => ("<address>".to_string(), false),
        };
        write!(f, "{}{}", body, if hardened { "'" } else { "" })
    }
}

/// Parameters used to fill a scheme's placeholders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemeParams {
    pub coin_type: u32,
    pub account: u32,
    pub node: u32,
    pub address: u32,
}

impl SchemeParams {
    pub fn new(coin_type: u32) -> Self {
        Self {
            coin_type,
            ..Default::default()
        }
    }

    pub fn with_account(mut self, account: u32) -> Self {
        self.account = account;
        self
    }
}

/// Ordered template of path segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationScheme {
    segments: Vec<SchemeSegment>,
}

impl DerivationScheme {
    /// Parse a template like `44'/<coin_type>'/<account>'/<node>/<address>`
    pub fn parse(template: &str) -> Result<Self, HwLedgerError> {
        let mut segments = Vec::new();
        for raw in template.trim_start_matches("m/").split('/') {
            if raw.is_empty() {
                continue;
            }
            let (body, hardened) = match raw.strip_suffix('\'') {
                Some(body) => (body, true),
                None => (raw, false),
            };
            let segment = match body {
                "<coin_type>" => SchemeSegment::CoinType { hardened },
                "<account>" => SchemeSegment::Account { hardened },
                "<node>" => SchemeSegment::Node,
                "<address>" => SchemeSegment::Address,
                digits => SchemeSegment::Index {
                    value: digits
                        .parse()
                        .map_err(|_| HwLedgerError::InvalidDerivationPath(template.to_string()))?,
                    hardened,
                },
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[SchemeSegment] {
        &self.segments
    }

    fn account_position(&self) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| matches!(s, SchemeSegment::Account { .. }))
    }

    /// Segments preceding the account segment: the parent discovery path
    pub fn truncate_before_account(&self) -> Self {
        match self.account_position() {
            Some(pos) => Self {
                segments: self.segments[..pos].to_vec(),
            },
            None => self.clone(),
        }
    }

    /// Segments up to and including the account segment: the account root
    pub fn truncate_after_account(&self) -> Self {
        match self.account_position() {
            Some(pos) => Self {
                segments: self.segments[..=pos].to_vec(),
            },
            None => self.clone(),
        }
    }

    /// Fill every placeholder and render the path without the `m/` prefix
    pub fn instantiate(&self, params: &SchemeParams) -> String {
        self.segments
            .iter()
            .map(|segment| match *segment {
                SchemeSegment::Index { value, hardened } => harden(value, hardened),
                SchemeSegment::CoinType { hardened } => harden(params.coin_type, hardened),
                SchemeSegment::Account { hardened } => harden(params.account, hardened),
                SchemeSegment::Node => params.node.to_string(),
                SchemeSegment::Address => params.address.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for DerivationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join("/"))
    }
}

fn harden(value: u32, hardened: bool) -> String {
    if hardened {
        format!("{}'", value)
    } else {
        value.to_string()
    }
}

/// Path template for a currency under a derivation mode
pub fn resolve_scheme(
    currency: &CryptoCurrency,
    mode: DerivationMode,
) -> Result<DerivationScheme, HwLedgerError> {
    if !derivation_modes_for_currency(currency).contains(&mode) {
        return Err(HwLedgerError::unsupported_mode(currency.id, mode.as_str()));
    }

    let props = mode.properties();
    if let Some(template) = props.overrides_derivation {
        return DerivationScheme::parse(template);
    }

    let coin = match (props.is_unsplit, currency.forked_from, props.coin_type_override) {
        (true, Some(parent), _) => SchemeSegment::Index {
            value: get_currency_by_id(parent)?.coin_type,
            hardened: true,
        },
        (_, _, Some(coin_type)) => SchemeSegment::Index {
            value: coin_type,
            hardened: true,
        },
        _ => SchemeSegment::CoinType { hardened: true },
    };

    Ok(DerivationScheme {
        segments: vec![
            SchemeSegment::Index {
                value: props.purpose,
                hardened: true,
            },
            coin,
            SchemeSegment::Account { hardened: true },
            SchemeSegment::Node,
            SchemeSegment::Address,
        ],
    })
}

/// Parse an instantiated path string (with or without `m/`)
pub fn parse_path(path: &str) -> Result<DerivationPath, HwLedgerError> {
    let normalized = if path.starts_with("m/") || path == "m" {
        path.to_string()
    } else {
        format!("m/{}", path)
    };
    DerivationPath::from_str(&normalized)
        .map_err(|_| HwLedgerError::InvalidDerivationPath(path.to_string()))
}
