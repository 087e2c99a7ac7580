//! Core types for hardware wallet sessions and signing

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default account derivation path (first Ethereum-style account)
pub const DEFAULT_DERIVATION_PATH: &str = "44'/60'/0'/0/0";

/// Hardware wallet vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    /// Ledger devices (HID transport, Ethereum app)
    Ledger,

    /// Trezor devices (Trezor Connect)
    Trezor,
}

impl WalletType {
    /// All vendors known to this build
    pub const ALL: [WalletType; 2] = [WalletType::Ledger, WalletType::Trezor];

    /// Prefix used for device ids
    pub fn device_prefix(&self) -> &'static str {
        match self {
            WalletType::Ledger => "ledger",
            WalletType::Trezor => "trezor",
        }
    }
}

impl std::fmt::Display for WalletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.device_prefix())
    }
}

impl std::str::FromStr for WalletType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ledger" => Ok(WalletType::Ledger),
            "trezor" => Ok(WalletType::Trezor),
            other => Err(crate::error::Error::Validation(format!(
                "Invalid wallet type: {}",
                other
            ))),
        }
    }
}

/// Bookkeeping record for one connected device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSession {
    /// Unique per connection: vendor prefix + random suffix
    pub device_id: String,

    /// Vendor
    #[serde(rename = "type")]
    pub wallet_type: WalletType,

    /// Whether the vendor session is open
    pub connected: bool,

    /// Account address at the default derivation path
    pub address: String,
}

/// Generate a device id such as `ledgerk3j9x0a2b`
pub fn new_device_id(wallet_type: WalletType) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}{}", wallet_type.device_prefix(), suffix)
}

/// Request to sign serialized transaction bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub transaction_bytes: Vec<u8>,
    pub derivation_path: String,
}

impl SignRequest {
    /// Sign at the default account path
    pub fn at_default_path(transaction_bytes: Vec<u8>) -> Self {
        Self {
            transaction_bytes,
            derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
        }
    }
}

/// Signature produced by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// Hex signature with `0x` prefix
    pub signature: String,

    /// Hex public key with `0x` prefix
    pub public_key: String,
}
