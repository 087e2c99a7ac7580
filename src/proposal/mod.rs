//! Transfer proposals
//!
//! Proposals move through a small state machine; only the store mutates
//! them, and only approved proposals can be reserved for execution.

pub mod repository;
pub mod store;
pub mod types;

pub use repository::{InMemoryProposalRepository, JsonFileProposalRepository, ProposalRepository};
pub use store::{ExecutionReservation, ProposalStore};
pub use types::{ProposalDraft, ProposalStatus, TransactionProposal};
