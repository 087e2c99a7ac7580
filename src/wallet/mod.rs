//! Hardware wallet module
//!
//! Vendor adapters behind one signing capability, plus the registry of
//! connected devices.
//!
//! # Architecture
//!
//! ```text
//! WalletSessionRegistry ──► SignerTable ──► SignerAdapter
//!                                             ├─ LedgerSigner<T: LedgerTransport>
//!                                             └─ TrezorSigner<T: TrezorTransport>
//!
//! Transports: SimulatedDevice (signer.mode = "simulated")
//!             UnsupportedTransport (signer.mode = "hardware")
//! ```
//!
//! # Security
//!
//! Keys never leave the device. The simulated device exists for tests and
//! demos only; its signatures are SHA-256 placeholders.

pub mod adapter;
pub mod ledger;
pub mod registry;
pub mod simulated;
pub mod transport;
pub mod trezor;
pub mod types;

pub use adapter::{SignerAdapter, SignerFactory, SignerTable};
pub use ledger::{LedgerSigner, LedgerTransport};
pub use registry::WalletSessionRegistry;
pub use simulated::{verify_simulated_signature, SimulatedDevice};
pub use transport::UnsupportedTransport;
pub use trezor::{TrezorSigner, TrezorTransport};
pub use types::{SignRequest, SignResponse, WalletSession, WalletType, DEFAULT_DERIVATION_PATH};
