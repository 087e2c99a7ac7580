//! Ledger network module
//!
//! Submission and status lookup against the distributed ledger.
//!
//! # Architecture
//!
//! ```text
//! ExecutionCoordinator ──► dyn LedgerService
//!                            ├─ SimulatedLedger  (ledger.mode = "simulated")
//!                            └─ RpcLedgerClient  (ledger.mode = "rpc")
//! ```

pub mod rpc;
pub mod service;
pub mod simulated;
pub mod types;

pub use rpc::RpcLedgerClient;
pub use service::LedgerService;
pub use simulated::SimulatedLedger;
pub use types::{LedgerStatus, LedgerTxStatus, SignedTransaction, SubmitReceipt};
