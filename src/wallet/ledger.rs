//! Ledger signer
//!
//! Talks to the device's Ethereum app over a [`LedgerTransport`]. The app
//! returns signatures as separate `r`, `s`, `v` components.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::adapter::SignerAdapter;
use super::types::{
    new_device_id, SignRequest, SignResponse, WalletSession, WalletType, DEFAULT_DERIVATION_PATH,
};

/// Address reply from the Ethereum app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAddress {
    pub address: String,
    pub public_key: String,
}

/// Signature reply from the Ethereum app (hex components, no prefix)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSignature {
    pub r: String,
    pub s: String,
    pub v: String,
}

/// Channel to a Ledger device
#[async_trait]
pub trait LedgerTransport: Send + Sync + 'static {
    /// Open transport handle
    type Handle: Send + Sync;

    /// Open a transport to the first attached device
    async fn open(&self) -> Result<Self::Handle>;

    /// Derive the address at `path` (no `m/` prefix)
    async fn get_address(&self, handle: &Self::Handle, path: &str) -> Result<LedgerAddress>;

    /// Sign a raw transaction given as hex
    async fn sign_transaction(
        &self,
        handle: &Self::Handle,
        path: &str,
        raw_tx_hex: &str,
    ) -> Result<LedgerSignature>;

    /// True for in-process simulations
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Ledger expects paths without the `m/` prefix
pub fn ledger_path(path: &str) -> &str {
    path.strip_prefix("m/").unwrap_or(path)
}

struct LedgerSession<H> {
    handle: H,
    device_id: String,
    address: String,
}

/// Ledger implementation of [`SignerAdapter`]
pub struct LedgerSigner<T: LedgerTransport> {
    transport: Arc<T>,
    session: Mutex<Option<LedgerSession<T::Handle>>>,
}

impl<T: LedgerTransport> LedgerSigner<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<T: LedgerTransport> SignerAdapter for LedgerSigner<T> {
    fn wallet_type(&self) -> WalletType {
        WalletType::Ledger
    }

    fn is_simulated(&self) -> bool {
        self.transport.is_simulated()
    }

    async fn connect(&self) -> Result<WalletSession> {
        let handle = self.transport.open().await.map_err(|e| {
            warn!("Error connecting to Ledger: {}", e);
            Error::Connection(format!("Failed to connect to Ledger wallet: {}", e))
        })?;

        let account = self
            .transport
            .get_address(&handle, DEFAULT_DERIVATION_PATH)
            .await
            .map_err(|e| Error::Connection(format!("Failed to read Ledger address: {}", e)))?;

        let device_id = new_device_id(WalletType::Ledger);
        info!("Connected Ledger {} ({})", device_id, account.address);

        *self.session.lock().await = Some(LedgerSession {
            handle,
            device_id: device_id.clone(),
            address: account.address.clone(),
        });

        Ok(WalletSession {
            device_id,
            wallet_type: WalletType::Ledger,
            connected: true,
            address: account.address,
        })
    }

    async fn address(&self) -> Result<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.address.clone())
            .ok_or_else(|| Error::Connection("No Ledger session".to_string()))
    }

    async fn sign(&self, request: &SignRequest) -> Result<SignResponse> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| Error::Signing("No wallet connected".to_string()))?;

        let path = ledger_path(&request.derivation_path);
        let raw_tx_hex = hex::encode(&request.transaction_bytes);

        debug!(
            "Ledger {} signing {} bytes at {}",
            session.device_id,
            request.transaction_bytes.len(),
            path
        );

        let account = self
            .transport
            .get_address(&session.handle, path)
            .await
            .map_err(|e| Error::Signing(format!("Failed to sign transaction with Ledger: {}", e)))?;

        let signature = self
            .transport
            .sign_transaction(&session.handle, path, &raw_tx_hex)
            .await
            .map_err(|e| Error::Signing(format!("Failed to sign transaction with Ledger: {}", e)))?;

        Ok(SignResponse {
            signature: format!("0x{}{}{}", signature.r, signature.s, signature.v),
            public_key: account.public_key,
        })
    }

    async fn test_connection(&self) -> bool {
        let guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            return false;
        };

        match self
            .transport
            .get_address(&session.handle, DEFAULT_DERIVATION_PATH)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Ledger {} connection test failed: {}", session.device_id, e);
                false
            }
        }
    }

    async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            debug!("Closed Ledger session {}", session.device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::simulated::{verify_simulated_signature, SimulatedDevice};

    #[test]
    fn test_ledger_path() {
        assert_eq!(ledger_path("m/44'/60'/0'/0/0"), "44'/60'/0'/0/0");
        assert_eq!(ledger_path("44'/60'/0'/0/0"), "44'/60'/0'/0/0");
    }

    #[tokio::test]
    async fn test_sign_requires_session() {
        let signer = LedgerSigner::new(Arc::new(SimulatedDevice::from_seed("seed")));
        let result = signer
            .sign(&SignRequest::at_default_path(vec![1, 2, 3]))
            .await;
        assert!(matches!(result, Err(Error::Signing(_))));
        assert!(!signer.test_connection().await);
    }

    #[tokio::test]
    async fn test_connect_and_sign() {
        let signer = LedgerSigner::new(Arc::new(SimulatedDevice::from_seed("seed")));
        let session = signer.connect().await.unwrap();

        assert!(session.device_id.starts_with("ledger"));
        assert_eq!(signer.address().await.unwrap(), session.address);
        assert!(signer.test_connection().await);
        assert!(signer.is_simulated());

        let response = signer
            .sign(&SignRequest::at_default_path(b"payload".to_vec()))
            .await
            .unwrap();
        assert!(verify_simulated_signature(
            &response.signature,
            &response.public_key,
            DEFAULT_DERIVATION_PATH,
            b"payload"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_device() {
        let device = Arc::new(SimulatedDevice::from_seed("seed"));
        device.set_reachable(false);
        let signer = LedgerSigner::new(device);

        assert!(matches!(
            signer.connect().await,
            Err(Error::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_denied_signature() {
        let device = Arc::new(SimulatedDevice::from_seed("seed"));
        let signer = LedgerSigner::new(device.clone());
        signer.connect().await.unwrap();

        device.set_deny_signing(true);
        let result = signer
            .sign(&SignRequest::at_default_path(b"payload".to_vec()))
            .await;
        assert!(matches!(result, Err(Error::Signing(_))));
    }

    #[tokio::test]
    async fn test_disconnect_drops_session() {
        let signer = LedgerSigner::new(Arc::new(SimulatedDevice::from_seed("seed")));
        signer.connect().await.unwrap();
        signer.disconnect().await;

        assert!(signer.address().await.is_err());
        assert!(!signer.test_connection().await);
    }
}
