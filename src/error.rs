//! Error types for the vault core

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the vault core
#[derive(Error, Debug)]
pub enum Error {
    // Boundary validation
    #[error("Validation error: {0}")]
    Validation(String),

    // Lookup errors
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    // State machine errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Hardware wallet errors
    #[error("Wallet connection failed: {0}")]
    Connection(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    // Ledger service errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Transaction not known to ledger: {0}")]
    LedgerNotFound(String),

    /// Error object returned by the node; not retried
    #[error("Ledger RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("{operation} timed out after {ms}ms")]
    Timeout { operation: String, ms: u64 },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Proposal persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is transient and the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout { .. })
    }

    /// Check if this error means an identifier did not resolve
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ProposalNotFound(_) | Error::DeviceNotFound(_) | Error::LedgerNotFound(_)
        )
    }

    /// Check if this error came from the hardware wallet layer
    pub fn is_wallet_failure(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Signing(_))
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from bincode errors
impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from HTTP client errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout {
                operation: "ledger request".to_string(),
                ms: 0,
            }
        } else {
            Error::Network(e.to_string())
        }
    }
}
