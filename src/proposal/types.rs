//! Core types for transfer proposals

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::security::TransactionRequest;

/// Lifecycle state of a proposal
///
/// ```text
/// Pending ──approve──→ Approved ──execute──→ Executed
///    └────reject────→ Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Waiting for review
    Pending,

    /// Approved by an operator, may be executed
    Approved,

    /// Rejected by an operator
    Rejected,

    /// Signed and accepted by the ledger
    Executed,
}

impl ProposalStatus {
    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Rejected | ProposalStatus::Executed)
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProposalStatus::Pending => write!(f, "pending"),
            ProposalStatus::Approved => write!(f, "approved"),
            ProposalStatus::Rejected => write!(f, "rejected"),
            ProposalStatus::Executed => write!(f, "executed"),
        }
    }
}

/// A requested transfer awaiting review and execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionProposal {
    /// Unique proposal ID
    pub id: String,

    /// Amount to transfer (non-negative)
    pub amount: Decimal,

    /// Destination address, opaque to the core
    pub recipient: String,

    /// Free-form note from the proposer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Principal that created the proposal
    pub proposer: String,

    /// Current status
    pub status: ProposalStatus,

    /// When the proposal was created
    pub created_at: DateTime<Utc>,

    /// When the status last changed
    pub updated_at: DateTime<Utc>,

    /// Ledger digest, set iff status is Executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_digest: Option<String>,
}

impl TransactionProposal {
    /// New pending proposal from a draft
    pub fn from_draft(draft: ProposalDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            amount: draft.amount,
            recipient: draft.recipient,
            description: draft.description,
            proposer: draft.proposer,
            status: ProposalStatus::Pending,
            created_at: now,
            updated_at: now,
            transaction_digest: None,
        }
    }

    /// View of this proposal as a risk engine input
    pub fn as_request(&self) -> TransactionRequest {
        TransactionRequest {
            amount: self.amount,
            recipient: self.recipient.clone(),
            proposer: self.proposer.clone(),
        }
    }
}

/// Fields supplied by a client when proposing a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    pub amount: Decimal,
    pub recipient: String,
    #[serde(default)]
    pub description: Option<String>,
    pub proposer: String,
}

impl ProposalDraft {
    pub fn new(amount: Decimal, recipient: impl Into<String>, proposer: impl Into<String>) -> Self {
        Self {
            amount,
            recipient: recipient.into(),
            description: None,
            proposer: proposer.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Boundary validation, run before a draft reaches the store
    pub fn validate(&self) -> Result<()> {
        if self.recipient.trim().is_empty() {
            return Err(Error::Validation("recipient is required".to_string()));
        }
        if self.proposer.trim().is_empty() {
            return Err(Error::Validation("proposer is required".to_string()));
        }
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(Error::Validation(format!(
                "amount must be non-negative, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_draft_is_pending() {
        let proposal = TransactionProposal::from_draft(
            ProposalDraft::new(Decimal::from(5), "0x1", "alice").with_description("rent"),
        );

        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert_eq!(proposal.created_at, proposal.updated_at);
        assert_eq!(proposal.description.as_deref(), Some("rent"));
        assert!(proposal.transaction_digest.is_none());
    }

    #[test]
    fn test_draft_validation() {
        assert!(ProposalDraft::new(Decimal::from(5), "0x1", "alice")
            .validate()
            .is_ok());
        assert!(ProposalDraft::new(Decimal::ZERO, "0x1", "alice")
            .validate()
            .is_ok());
        assert!(matches!(
            ProposalDraft::new(Decimal::from(-1), "0x1", "alice").validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            ProposalDraft::new(Decimal::from(5), "  ", "alice").validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            ProposalDraft::new(Decimal::from(5), "0x1", "").validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ProposalStatus::Pending.is_terminal());
        assert!(!ProposalStatus::Approved.is_terminal());
        assert!(ProposalStatus::Rejected.is_terminal());
        assert!(ProposalStatus::Executed.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ProposalStatus::Executed).unwrap();
        assert_eq!(json, "\"executed\"");
    }
}
