//! Mutable policy configuration
//!
//! Read on every assessment, written rarely, so it sits behind an RwLock.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::audit::SecurityAuditLog;
use super::types::{SecurityConfig, SecurityConfigPatch, Severity};

/// Single source of truth for the active security policy
pub struct SecurityConfigStore {
    current: RwLock<SecurityConfig>,
    audit: Arc<SecurityAuditLog>,
}

impl SecurityConfigStore {
    /// Create a store seeded with `initial`
    pub fn new(initial: SecurityConfig, audit: Arc<SecurityAuditLog>) -> Self {
        Self {
            current: RwLock::new(initial),
            audit,
        }
    }

    /// Owned copy of the current config
    pub async fn get(&self) -> SecurityConfig {
        self.current.read().await.clone()
    }

    /// Merge `patch` over the current config and return the result
    ///
    /// No bounds checks are applied; a negative maximum is stored as given.
    pub async fn update(&self, patch: SecurityConfigPatch) -> SecurityConfig {
        let updated = {
            let mut current = self.current.write().await;
            current.merge(patch);
            current.clone()
        };

        debug!(
            "Security config now: level={}, max={}, allow-list={}",
            updated.security_level,
            updated.max_transaction_amount,
            updated.allowed_addresses.len()
        );

        self.audit
            .append(
                "config_updated",
                Severity::Info,
                "Security configuration updated",
                None,
            )
            .await;

        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::types::SecurityLevel;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_update_merges_and_logs() {
        let audit = Arc::new(SecurityAuditLog::new());
        let store = SecurityConfigStore::new(SecurityConfig::default(), audit.clone());

        let updated = store
            .update(SecurityConfigPatch {
                security_level: Some(SecurityLevel::Low),
                ..Default::default()
            })
            .await;

        assert_eq!(updated.security_level, SecurityLevel::Low);
        assert_eq!(updated.max_transaction_amount, Decimal::from(10_000));
        assert_eq!(store.get().await, updated);

        let entries = audit.tail(10).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "config_updated");
    }

    #[tokio::test]
    async fn test_get_returns_detached_copy() {
        let audit = Arc::new(SecurityAuditLog::new());
        let store = SecurityConfigStore::new(SecurityConfig::default(), audit);

        let mut copy = store.get().await;
        copy.allowed_addresses.insert("0xabc".to_string());

        assert!(store.get().await.allowed_addresses.is_empty());
    }

    #[tokio::test]
    async fn test_negative_max_is_accepted() {
        let audit = Arc::new(SecurityAuditLog::new());
        let store = SecurityConfigStore::new(SecurityConfig::default(), audit);

        let updated = store
            .update(SecurityConfigPatch {
                max_transaction_amount: Some(Decimal::from(-5)),
                ..Default::default()
            })
            .await;

        assert_eq!(updated.max_transaction_amount, Decimal::from(-5));
    }
}
