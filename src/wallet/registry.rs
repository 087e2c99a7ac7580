//! Registry of connected hardware wallet sessions
//!
//! Owns one adapter per connected device and tracks which device is the
//! current one. The table lock is never held across device I/O.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::adapter::{SignerAdapter, SignerTable};
use super::types::{WalletSession, WalletType};

struct ConnectedDevice {
    session: WalletSession,
    signer: Arc<dyn SignerAdapter>,
}

#[derive(Default)]
struct SessionTable {
    devices: HashMap<String, ConnectedDevice>,
    /// Insertion order, for stable listing
    order: Vec<String>,
    current: Option<String>,
}

/// Connected devices keyed by device id, plus a current pointer
pub struct WalletSessionRegistry {
    signers: SignerTable,
    table: RwLock<SessionTable>,
}

impl WalletSessionRegistry {
    pub fn new(signers: SignerTable) -> Self {
        Self {
            signers,
            table: RwLock::new(SessionTable::default()),
        }
    }

    /// Vendors this registry can connect to
    pub fn supported(&self) -> Vec<WalletType> {
        self.signers.supported()
    }

    /// Connect a new device and make it current
    pub async fn connect(&self, wallet_type: WalletType) -> Result<WalletSession> {
        let signer = self.signers.create(wallet_type)?;
        let session = signer.connect().await?;

        let mut table = self.table.write().await;
        table.order.push(session.device_id.clone());
        table.current = Some(session.device_id.clone());
        table.devices.insert(
            session.device_id.clone(),
            ConnectedDevice {
                session: session.clone(),
                signer,
            },
        );

        info!(
            "Registered {} device {} ({} connected)",
            wallet_type,
            session.device_id,
            table.devices.len()
        );
        Ok(session)
    }

    /// Disconnect and forget a device
    pub async fn disconnect(&self, device_id: &str) -> Result<()> {
        let removed = {
            let mut table = self.table.write().await;
            let removed = table
                .devices
                .remove(device_id)
                .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;
            table.order.retain(|id| id != device_id);
            if table.current.as_deref() == Some(device_id) {
                table.current = None;
            }
            removed
        };

        removed.signer.disconnect().await;
        info!("Disconnected device {}", device_id);
        Ok(())
    }

    /// Session of the current device, if any
    pub async fn current(&self) -> Option<WalletSession> {
        let table = self.table.read().await;
        table
            .current
            .as_ref()
            .and_then(|id| table.devices.get(id))
            .map(|d| d.session.clone())
    }

    pub async fn session(&self, device_id: &str) -> Result<WalletSession> {
        self.table
            .read()
            .await
            .devices
            .get(device_id)
            .map(|d| d.session.clone())
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))
    }

    /// Adapter bound to a connected device
    pub async fn signer(&self, device_id: &str) -> Result<Arc<dyn SignerAdapter>> {
        self.table
            .read()
            .await
            .devices
            .get(device_id)
            .map(|d| d.signer.clone())
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))
    }

    /// All connected sessions in connection order
    pub async fn list(&self) -> Vec<WalletSession> {
        let table = self.table.read().await;
        table
            .order
            .iter()
            .filter_map(|id| table.devices.get(id))
            .map(|d| d.session.clone())
            .collect()
    }

    /// Probe a device; false if unknown or unreachable
    pub async fn test_connection(&self, device_id: &str) -> bool {
        match self.signer(device_id).await {
            Ok(signer) => signer.test_connection().await,
            Err(_) => {
                debug!("Connection test for unknown device {}", device_id);
                false
            }
        }
    }

    /// Probe every connected device concurrently
    pub async fn test_all(&self) -> Vec<(String, bool)> {
        let devices: Vec<(String, Arc<dyn SignerAdapter>)> = {
            let table = self.table.read().await;
            table
                .order
                .iter()
                .filter_map(|id| table.devices.get(id).map(|d| (id.clone(), d.signer.clone())))
                .collect()
        };

        join_all(devices.into_iter().map(|(id, signer)| async move {
            let alive = signer.test_connection().await;
            (id, alive)
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::simulated::SimulatedDevice;

    fn registry() -> (WalletSessionRegistry, Arc<SimulatedDevice>) {
        let device = Arc::new(SimulatedDevice::from_seed("registry"));
        (
            WalletSessionRegistry::new(SignerTable::simulated(device.clone())),
            device,
        )
    }

    #[tokio::test]
    async fn test_connect_sets_current() {
        let (registry, _) = registry();
        assert!(registry.current().await.is_none());

        let first = registry.connect(WalletType::Ledger).await.unwrap();
        let second = registry.connect(WalletType::Trezor).await.unwrap();

        assert_ne!(first.device_id, second.device_id);
        assert_eq!(registry.current().await.unwrap(), second);
        assert_eq!(registry.list().await, vec![first.clone(), second.clone()]);
        assert_eq!(registry.session(&first.device_id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_disconnect_clears_current_only_when_matching() {
        let (registry, _) = registry();
        let first = registry.connect(WalletType::Ledger).await.unwrap();
        let second = registry.connect(WalletType::Ledger).await.unwrap();

        registry.disconnect(&first.device_id).await.unwrap();
        assert_eq!(registry.current().await.unwrap(), second);

        registry.disconnect(&second.device_id).await.unwrap();
        assert!(registry.current().await.is_none());
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.disconnect("ledgerxxxxxxxxx").await,
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            registry.signer("ledgerxxxxxxxxx").await,
            Err(Error::DeviceNotFound(_))
        ));
        assert!(!registry.test_connection("ledgerxxxxxxxxx").await);
    }

    #[tokio::test]
    async fn test_connection_follows_device() {
        let (registry, device) = registry();
        let session = registry.connect(WalletType::Trezor).await.unwrap();
        assert!(registry.test_connection(&session.device_id).await);

        device.set_reachable(false);
        assert!(!registry.test_connection(&session.device_id).await);
        assert_eq!(
            registry.test_all().await,
            vec![(session.device_id.clone(), false)]
        );
    }

    #[tokio::test]
    async fn test_failed_connect_registers_nothing() {
        let (registry, device) = registry();
        device.set_reachable(false);

        assert!(matches!(
            registry.connect(WalletType::Ledger).await,
            Err(Error::Connection(_))
        ));
        assert!(registry.list().await.is_empty());
        assert!(registry.current().await.is_none());
    }
}
