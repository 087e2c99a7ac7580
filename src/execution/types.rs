//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::LedgerTxStatus;
use crate::proposal::TransactionProposal;

/// Unit handed to the signer, encoded with bincode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub proposal_id: String,

    /// Address of the signing device's account
    pub sender: String,

    pub recipient: String,

    pub amount: Decimal,

    /// Proposal description, if any
    pub memo: Option<String>,
}

impl TransactionPayload {
    /// Payload transferring `proposal`'s amount from `sender`
    pub fn for_proposal(proposal: &TransactionProposal, sender: &str) -> Self {
        Self {
            proposal_id: proposal.id.clone(),
            sender: sender.to_string(),
            recipient: proposal.recipient.clone(),
            amount: proposal.amount,
            memo: proposal.description.clone(),
        }
    }

    /// Bytes to sign
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// Result of a successful execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
    /// Ledger digest
    pub transaction_id: String,
    pub proposal_id: String,
    pub status: LedgerTxStatus,
    pub timestamp: DateTime<Utc>,

    /// Signature returned by the device
    pub signature: String,

    /// Public key the device signed with
    pub public_key: String,

    /// Hex of the signed payload bytes
    pub signed_payload: String,

    pub derivation_path: String,
}

/// Ledger-side status of an executed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusReport {
    pub transaction_id: String,
    pub status: LedgerTxStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalDraft;

    #[test]
    fn test_payload_binds_proposal_and_sender() {
        let proposal = TransactionProposal::from_draft(
            ProposalDraft::new(Decimal::new(1250, 2), "0xbob", "alice").with_description("rent"),
        );
        let payload = TransactionPayload::for_proposal(&proposal, "0xvault");

        assert_eq!(payload.proposal_id, proposal.id);
        assert_eq!(payload.memo.as_deref(), Some("rent"));

        let bytes = payload.encode().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(bytes, payload.clone().encode().unwrap());

        let other = TransactionPayload::for_proposal(&proposal, "0xother");
        assert_ne!(bytes, other.encode().unwrap());
    }

    #[test]
    fn test_receipt_wire_format() {
        let receipt = ExecutionReceipt {
            transaction_id: "abc".to_string(),
            proposal_id: "p1".to_string(),
            status: LedgerTxStatus::Success,
            timestamp: Utc::now(),
            signature: "0x01".to_string(),
            public_key: "0x02".to_string(),
            signed_payload: "beef".to_string(),
            derivation_path: "44'/60'/0'/0/0".to_string(),
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["transactionId"], "abc");
        assert_eq!(json["status"], "success");
        assert_eq!(json["publicKey"], "0x02");
        assert_eq!(json["signedPayload"], "beef");
    }
}
