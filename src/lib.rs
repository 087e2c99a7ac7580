//! airgap-vault library
//!
//! Transfer proposals reviewed under a risk policy and executed through a
//! hardware wallet signer.
//!
//! ```text
//! ProposalStore ─► ExecutionCoordinator ─► WalletSessionRegistry ─► SignerAdapter
//!       ▲                    │
//!  SecurityService           └────────────► LedgerService
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod network;
pub mod proposal;
pub mod security;
pub mod wallet;

// Re-export commonly used types
pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
