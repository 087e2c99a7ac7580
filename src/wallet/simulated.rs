//! Simulated hardware device
//!
//! Used only when the signer mode is `simulated`. Keys and signatures are
//! deterministic placeholders derived with SHA-256 from a device seed; they
//! are not secp256k1 and carry no security.
//!
//! ```text
//! public_key = sha256(seed ‖ path)
//! address    = 0x ‖ sha256(public_key)[..20]
//! r          = sha256(public_key ‖ path ‖ tx)
//! s          = sha256(r)
//! signature  = 0x ‖ r ‖ s ‖ 1b
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

use super::ledger::{LedgerAddress, LedgerSignature, LedgerTransport};
use super::trezor::{TrezorAddress, TrezorResponse, TrezorSignature, TrezorTransport};

const RECOVERY_BYTE: u8 = 0x1b;

/// Handle to an open simulated session
#[derive(Debug, Clone)]
pub struct SimulatedHandle {
    pub serial: String,
}

/// In-process stand-in for a Ledger or Trezor device
pub struct SimulatedDevice {
    seed: [u8; 32],
    serial: String,
    reachable: AtomicBool,
    deny_signing: AtomicBool,
    sign_delay_ms: AtomicU64,
}

impl SimulatedDevice {
    /// Device whose keys derive from `seed`
    pub fn from_seed(seed: impl AsRef<[u8]>) -> Self {
        let seed: [u8; 32] = Sha256::digest(seed.as_ref()).into();
        Self {
            serial: hex::encode(&seed[..4]),
            seed,
            reachable: AtomicBool::new(true),
            deny_signing: AtomicBool::new(false),
            sign_delay_ms: AtomicU64::new(0),
        }
    }

    /// Device with a random seed
    pub fn random() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Simulate plugging or unplugging the device
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Simulate the user rejecting signing requests on the device
    pub fn set_deny_signing(&self, deny: bool) {
        self.deny_signing.store(deny, Ordering::SeqCst);
    }

    /// Simulate the user taking time to confirm on the device
    pub fn set_sign_delay(&self, delay: Duration) {
        self.sign_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Public key at `path`
    pub fn public_key(&self, path: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.seed);
        hasher.update(canonical_path(path).as_bytes());
        hasher.finalize().into()
    }

    /// Account address at `path`
    pub fn address(&self, path: &str) -> String {
        address_for(&self.public_key(path))
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Connection(format!(
                "Simulated device {} is not reachable",
                self.serial
            )))
        }
    }

    fn handle(&self) -> Result<SimulatedHandle> {
        self.ensure_reachable()?;
        Ok(SimulatedHandle {
            serial: self.serial.clone(),
        })
    }

    /// Wait for the simulated confirmation, then produce `(r, s, v)`
    async fn confirm_and_sign(&self, path: &str, raw_tx_hex: &str) -> Result<([u8; 32], [u8; 32], u8)> {
        self.ensure_reachable()?;

        let delay = self.sign_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.deny_signing.load(Ordering::SeqCst) {
            return Err(Error::Signing("Action cancelled by user".to_string()));
        }

        let tx = hex::decode(raw_tx_hex)
            .map_err(|e| Error::Signing(format!("Invalid transaction hex: {}", e)))?;
        Ok(signature_parts(&self.public_key(path), path, &tx))
    }
}

#[async_trait]
impl LedgerTransport for SimulatedDevice {
    type Handle = SimulatedHandle;

    async fn open(&self) -> Result<SimulatedHandle> {
        self.handle()
    }

    async fn get_address(&self, _handle: &SimulatedHandle, path: &str) -> Result<LedgerAddress> {
        self.ensure_reachable()?;
        let public_key = self.public_key(path);
        Ok(LedgerAddress {
            address: address_for(&public_key),
            public_key: format!("0x{}", hex::encode(public_key)),
        })
    }

    async fn sign_transaction(
        &self,
        _handle: &SimulatedHandle,
        path: &str,
        raw_tx_hex: &str,
    ) -> Result<LedgerSignature> {
        let (r, s, v) = self.confirm_and_sign(path, raw_tx_hex).await?;
        Ok(LedgerSignature {
            r: hex::encode(r),
            s: hex::encode(s),
            v: hex::encode([v]),
        })
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

#[async_trait]
impl TrezorTransport for SimulatedDevice {
    type Handle = SimulatedHandle;

    async fn init(&self) -> Result<SimulatedHandle> {
        self.handle()
    }

    async fn get_address(
        &self,
        _handle: &SimulatedHandle,
        path: &str,
        _show_on_device: bool,
    ) -> Result<TrezorResponse<TrezorAddress>> {
        if self.ensure_reachable().is_err() {
            return Ok(TrezorResponse::failed("Device disconnected"));
        }
        Ok(TrezorResponse::ok(TrezorAddress {
            address: self.address(path),
            serialized_path: path.to_string(),
        }))
    }

    async fn sign_transaction(
        &self,
        _handle: &SimulatedHandle,
        path: &str,
        raw_tx_hex: &str,
    ) -> Result<TrezorResponse<TrezorSignature>> {
        match self.confirm_and_sign(path, raw_tx_hex).await {
            Ok((r, s, v)) => Ok(TrezorResponse::ok(TrezorSignature {
                signature: encode_signature(&r, &s, v),
                public_key: format!("0x{}", hex::encode(self.public_key(path))),
            })),
            Err(Error::Signing(reason)) => Ok(TrezorResponse::failed(reason)),
            Err(e) => Err(e),
        }
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

fn canonical_path(path: &str) -> &str {
    path.strip_prefix("m/").unwrap_or(path)
}

fn address_for(public_key: &[u8; 32]) -> String {
    let digest = Sha256::digest(public_key);
    format!("0x{}", hex::encode(&digest[..20]))
}

fn signature_parts(public_key: &[u8; 32], path: &str, tx: &[u8]) -> ([u8; 32], [u8; 32], u8) {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    hasher.update(canonical_path(path).as_bytes());
    hasher.update(tx);
    let r: [u8; 32] = hasher.finalize().into();
    let s: [u8; 32] = Sha256::digest(r).into();
    (r, s, RECOVERY_BYTE)
}

fn encode_signature(r: &[u8; 32], s: &[u8; 32], v: u8) -> String {
    format!("0x{}{}{}", hex::encode(r), hex::encode(s), hex::encode([v]))
}

/// Check a signature produced by a [`SimulatedDevice`]
///
/// Returns false for malformed input rather than failing.
pub fn verify_simulated_signature(
    signature: &str,
    public_key: &str,
    path: &str,
    message: &[u8],
) -> bool {
    let key_hex = public_key.strip_prefix("0x").unwrap_or(public_key);
    let Ok(bytes) = hex::decode(key_hex) else {
        return false;
    };
    let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) else {
        return false;
    };

    let (r, s, v) = signature_parts(&key, path, message);
    signature.eq_ignore_ascii_case(&encode_signature(&r, &s, v))
}
