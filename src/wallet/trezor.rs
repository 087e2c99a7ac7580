//! Trezor signer
//!
//! Mirrors the Trezor Connect call shape: every call returns an envelope with
//! a `success` flag and either a payload or an error message.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::adapter::SignerAdapter;
use super::types::{
    new_device_id, SignRequest, SignResponse, WalletSession, WalletType, DEFAULT_DERIVATION_PATH,
};

/// Trezor Connect response envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrezorResponse<T> {
    pub success: bool,
    pub payload: Option<T>,
    pub error: Option<String>,
}

impl<T> TrezorResponse<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Unwrap the payload, or describe why there is none
    pub fn into_payload(self) -> std::result::Result<T, String> {
        match (self.success, self.payload) {
            (true, Some(payload)) => Ok(payload),
            _ => Err(self.error.unwrap_or_else(|| "unknown Trezor error".to_string())),
        }
    }
}

/// `getAddress` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrezorAddress {
    pub address: String,
    pub serialized_path: String,
}

/// `signTransaction` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrezorSignature {
    pub signature: String,
    pub public_key: String,
}

/// Trezor Connect style channel
#[async_trait]
pub trait TrezorTransport: Send + Sync + 'static {
    /// Initialized connect handle
    type Handle: Send + Sync;

    /// Initialize Trezor Connect
    async fn init(&self) -> Result<Self::Handle>;

    /// Derive the address at `path` (with `m/` prefix)
    async fn get_address(
        &self,
        handle: &Self::Handle,
        path: &str,
        show_on_device: bool,
    ) -> Result<TrezorResponse<TrezorAddress>>;

    /// Sign a raw transaction given as hex
    async fn sign_transaction(
        &self,
        handle: &Self::Handle,
        path: &str,
        raw_tx_hex: &str,
    ) -> Result<TrezorResponse<TrezorSignature>>;

    /// True for in-process simulations
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Trezor expects paths with the `m/` prefix
pub fn trezor_path(path: &str) -> String {
    if path.starts_with("m/") {
        path.to_string()
    } else {
        format!("m/{}", path)
    }
}

struct TrezorSession<H> {
    handle: H,
    device_id: String,
    address: String,
}

/// Trezor implementation of [`SignerAdapter`]
pub struct TrezorSigner<T: TrezorTransport> {
    transport: Arc<T>,
    session: Mutex<Option<TrezorSession<T::Handle>>>,
}

impl<T: TrezorTransport> TrezorSigner<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<T: TrezorTransport> SignerAdapter for TrezorSigner<T> {
    fn wallet_type(&self) -> WalletType {
        WalletType::Trezor
    }

    fn is_simulated(&self) -> bool {
        self.transport.is_simulated()
    }

    async fn connect(&self) -> Result<WalletSession> {
        let handle = self.transport.init().await.map_err(|e| {
            warn!("Failed to initialize Trezor Connect: {}", e);
            Error::Connection(format!("Failed to connect to Trezor wallet: {}", e))
        })?;

        let account = self
            .transport
            .get_address(&handle, &trezor_path(DEFAULT_DERIVATION_PATH), false)
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect to Trezor wallet: {}", e)))?
            .into_payload()
            .map_err(|e| Error::Connection(format!("Failed to connect to Trezor: {}", e)))?;

        let device_id = new_device_id(WalletType::Trezor);
        info!("Connected Trezor {} ({})", device_id, account.address);

        *self.session.lock().await = Some(TrezorSession {
            handle,
            device_id: device_id.clone(),
            address: account.address.clone(),
        });

        Ok(WalletSession {
            device_id,
            wallet_type: WalletType::Trezor,
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
            .ok_or_else(|| Error::Connection("No Trezor session".to_string()))
    }

    async fn sign(&self, request: &SignRequest) -> Result<SignResponse> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| Error::Signing("No wallet connected".to_string()))?;

        let path = trezor_path(&request.derivation_path);
        debug!(
            "Trezor {} signing {} bytes at {}",
            session.device_id,
            request.transaction_bytes.len(),
            path
        );

        let signed = self
            .transport
            .sign_transaction(
                &session.handle,
                &path,
                &hex::encode(&request.transaction_bytes),
            )
            .await
            .map_err(|e| Error::Signing(format!("Failed to sign transaction with Trezor: {}", e)))?
            .into_payload()
            .map_err(|e| Error::Signing(format!("Trezor declined to sign: {}", e)))?;

        Ok(SignResponse {
            signature: signed.signature,
            public_key: signed.public_key,
        })
    }

    async fn test_connection(&self) -> bool {
        let guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            return false;
        };

        match self
            .transport
            .get_address(&session.handle, &trezor_path(DEFAULT_DERIVATION_PATH), false)
            .await
        {
            Ok(response) => response.success,
            Err(e) => {
                warn!("Trezor {} connection test failed: {}", session.device_id, e);
                false
            }
        }
    }

    async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            debug!("Closed Trezor session {}", session.device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::simulated::{verify_simulated_signature, SimulatedDevice};

    #[test]
    fn test_trezor_path() {
        assert_eq!(trezor_path("44'/60'/0'/0/0"), "m/44'/60'/0'/0/0");
        assert_eq!(trezor_path("m/44'/60'/0'/0/0"), "m/44'/60'/0'/0/0");
    }

    #[test]
    fn test_response_envelope() {
        assert_eq!(TrezorResponse::ok(5).into_payload(), Ok(5));
        assert_eq!(
            TrezorResponse::<u8>::failed("Cancelled").into_payload(),
            Err("Cancelled".to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_and_sign() {
        let signer = TrezorSigner::new(Arc::new(SimulatedDevice::from_seed("seed")));
        let session = signer.connect().await.unwrap();
        assert!(session.device_id.starts_with("trezor"));

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
    async fn test_same_device_same_address_across_vendors() {
        let device = Arc::new(SimulatedDevice::from_seed("seed"));
        let trezor = TrezorSigner::new(device.clone());
        let ledger = crate::wallet::ledger::LedgerSigner::new(device);

        let a = trezor.connect().await.unwrap();
        let b = ledger.connect().await.unwrap();
        assert_eq!(a.address, b.address);
    }

    #[tokio::test]
    async fn test_cancelled_on_device() {
        let device = Arc::new(SimulatedDevice::from_seed("seed"));
        let signer = TrezorSigner::new(device.clone());
        signer.connect().await.unwrap();

        device.set_deny_signing(true);
        let result = signer
            .sign(&SignRequest::at_default_path(b"payload".to_vec()))
            .await;
        assert!(matches!(result, Err(Error::Signing(_))));
    }
}
