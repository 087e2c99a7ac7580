//! Security policy module
//!
//! Holds the mutable policy config, the append-only audit log and the risk
//! engine that screens transfer proposals.
//!
//! # Architecture
//!
//! ```text
//! SecurityConfigStore ──┐
//!                       ├──→ RiskEngine ──→ SecurityAuditLog
//! RecipientHistory ─────┘
//!
//! SecurityService = config + audit + risk + scan + recommendations
//! ```

pub mod audit;
pub mod config_store;
pub mod history;
pub mod risk;
pub mod service;
pub mod types;

pub use audit::SecurityAuditLog;
pub use config_store::SecurityConfigStore;
pub use history::{AlwaysUnseen, ObservedRecipients, RecipientHistory, RecipientHistoryMode};
pub use risk::{score_transaction, RiskEngine};
pub use service::SecurityService;
pub use types::{
    RiskAssessment, RiskLevel, ScanReport, ScanResults, SecurityConfig, SecurityConfigPatch,
    SecurityLevel, SecurityLogEntry, Severity, TransactionRequest,
};
