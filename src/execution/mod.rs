//! Execution of approved proposals

pub mod coordinator;
pub mod types;

pub use coordinator::{ExecutionCoordinator, ExecutionSettings};
pub use types::{ExecutionReceipt, TransactionPayload, TransactionStatusReport};
