//! Ledger-facing types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Transaction bytes with the device signature attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    /// Bincode-encoded payload exactly as signed
    pub transaction_bytes: Vec<u8>,

    /// Hex signature with `0x` prefix
    pub signature: String,

    /// Hex public key with `0x` prefix
    pub public_key: String,
}

impl SignedTransaction {
    /// Content digest used by the simulated ledger
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.transaction_bytes);
        hasher.update(self.signature.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Ledger acknowledgement of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub digest: String,
}

/// Settlement state reported by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerTxStatus {
    Success,
    Failed,
    Pending,
}

impl std::fmt::Display for LedgerTxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerTxStatus::Success => write!(f, "success"),
            LedgerTxStatus::Failed => write!(f, "failed"),
            LedgerTxStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Status lookup result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub status: LedgerTxStatus,
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_digest_covers_signature() {
        let a = SignedTransaction {
            transaction_bytes: vec![1, 2, 3],
            signature: "0xaa".to_string(),
            public_key: "0xbb".to_string(),
        };
        let mut b = a.clone();
        b.signature = "0xab".to_string();

        assert_eq!(a.content_digest().len(), 64);
        assert_eq!(a.content_digest(), a.clone().content_digest());
        assert_ne!(a.content_digest(), b.content_digest());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&LedgerTxStatus::Pending).unwrap(),
            "\"pending\""
        );
    }
}
