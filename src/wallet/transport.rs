//! Transport selection for the signer table

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::adapter::{SignerAdapter, SignerTable};
use super::ledger::{LedgerAddress, LedgerSignature, LedgerSigner, LedgerTransport};
use super::simulated::SimulatedDevice;
use super::trezor::{TrezorAddress, TrezorResponse, TrezorSignature, TrezorSigner, TrezorTransport};
use super::types::WalletType;

/// Stand-in for the USB HID transport, which this build does not ship
///
/// Every session attempt fails with `Error::Connection`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedTransport;

impl UnsupportedTransport {
    fn unavailable(vendor: WalletType) -> Error {
        Error::Connection(format!(
            "USB HID transport for {} devices is not available in this build; use signer.mode = \"simulated\"",
            vendor
        ))
    }
}

#[async_trait]
impl LedgerTransport for UnsupportedTransport {
    type Handle = ();

    async fn open(&self) -> Result<()> {
        Err(Self::unavailable(WalletType::Ledger))
    }

    async fn get_address(&self, _handle: &(), _path: &str) -> Result<LedgerAddress> {
        Err(Self::unavailable(WalletType::Ledger))
    }

    async fn sign_transaction(
        &self,
        _handle: &(),
        _path: &str,
        _raw_tx_hex: &str,
    ) -> Result<LedgerSignature> {
        Err(Self::unavailable(WalletType::Ledger))
    }
}

#[async_trait]
impl TrezorTransport for UnsupportedTransport {
    type Handle = ();

    async fn init(&self) -> Result<()> {
        Err(Self::unavailable(WalletType::Trezor))
    }

    async fn get_address(
        &self,
        _handle: &(),
        _path: &str,
        _show_on_device: bool,
    ) -> Result<TrezorResponse<TrezorAddress>> {
        Err(Self::unavailable(WalletType::Trezor))
    }

    async fn sign_transaction(
        &self,
        _handle: &(),
        _path: &str,
        _raw_tx_hex: &str,
    ) -> Result<TrezorResponse<TrezorSignature>> {
        Err(Self::unavailable(WalletType::Trezor))
    }
}

impl SignerTable {
    /// Both vendors backed by one simulated device
    pub fn simulated(device: Arc<SimulatedDevice>) -> Self {
        let ledger_device = device.clone();
        let trezor_device = device;

        Self::new()
            .with(
                WalletType::Ledger,
                Arc::new(move || -> Arc<dyn SignerAdapter> {
                    Arc::new(LedgerSigner::new(ledger_device.clone()))
                }),
            )
            .with(
                WalletType::Trezor,
                Arc::new(move || -> Arc<dyn SignerAdapter> {
                    Arc::new(TrezorSigner::new(trezor_device.clone()))
                }),
            )
    }

    /// Both vendors over the hardware transport
    pub fn hardware() -> Self {
        let transport = Arc::new(UnsupportedTransport);
        let ledger_transport = transport.clone();
        let trezor_transport = transport;

        Self::new()
            .with(
                WalletType::Ledger,
                Arc::new(move || -> Arc<dyn SignerAdapter> {
                    Arc::new(LedgerSigner::new(ledger_transport.clone()))
                }),
            )
            .with(
                WalletType::Trezor,
                Arc::new(move || -> Arc<dyn SignerAdapter> {
                    Arc::new(TrezorSigner::new(trezor_transport.clone()))
                }),
            )
    }
}
