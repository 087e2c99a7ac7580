//! Signer capability interface
//!
//! One [`SignerAdapter`] implementation per vendor. Adapters are created per
//! connection through a [`SignerTable`] keyed by [`WalletType`], so adding a
//! vendor means registering another factory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::{SignRequest, SignResponse, WalletSession, WalletType};

/// Vendor-specific signer bound to at most one device session
#[async_trait]
pub trait SignerAdapter: Send + Sync {
    /// Vendor this adapter speaks to
    fn wallet_type(&self) -> WalletType;

    /// True if signatures come from a simulated device
    fn is_simulated(&self) -> bool {
        false
    }

    /// Open a vendor session and derive the default account address
    ///
    /// Fails with `Error::Connection` if the device is unreachable.
    async fn connect(&self) -> Result<WalletSession>;

    /// Address of the active session
    async fn address(&self) -> Result<String>;

    /// Sign transaction bytes at the requested derivation path
    ///
    /// Fails with `Error::Signing` if no session is open or the device
    /// denies or cancels the request.
    async fn sign(&self, request: &SignRequest) -> Result<SignResponse>;

    /// Best-effort liveness probe; never fails
    async fn test_connection(&self) -> bool;

    /// Release the vendor session handle
    async fn disconnect(&self);
}

/// Creates a fresh adapter for each new connection
pub trait SignerFactory: Send + Sync {
    fn create(&self) -> Arc<dyn SignerAdapter>;
}

impl<F> SignerFactory for F
where
    F: Fn() -> Arc<dyn SignerAdapter> + Send + Sync,
{
    fn create(&self) -> Arc<dyn SignerAdapter> {
        self()
    }
}

/// Lookup table from vendor to adapter factory
#[derive(Default, Clone)]
pub struct SignerTable {
    factories: HashMap<WalletType, Arc<dyn SignerFactory>>,
}

impl SignerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for a vendor
    pub fn register(&mut self, wallet_type: WalletType, factory: Arc<dyn SignerFactory>) {
        self.factories.insert(wallet_type, factory);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, wallet_type: WalletType, factory: Arc<dyn SignerFactory>) -> Self {
        self.register(wallet_type, factory);
        self
    }

    /// New adapter for `wallet_type`
    pub fn create(&self, wallet_type: WalletType) -> Result<Arc<dyn SignerAdapter>> {
        self.factories
            .get(&wallet_type)
            .map(|factory| factory.create())
            .ok_or_else(|| {
                Error::Connection(format!("No signer registered for {} wallets", wallet_type))
            })
    }

    /// Vendors with a registered factory
    pub fn supported(&self) -> Vec<WalletType> {
        WalletType::ALL
            .into_iter()
            .filter(|t| self.factories.contains_key(t))
            .collect()
    }
}
