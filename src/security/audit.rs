//! Append-only security audit log
//!
//! Entries are kept for the lifetime of the process and mirrored to tracing.

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::types::{SecurityLogEntry, Severity};

/// Ordered, append-only record of policy changes, assessments and scans
#[derive(Default)]
pub struct SecurityAuditLog {
    entries: RwLock<Vec<SecurityLogEntry>>,
}

impl SecurityAuditLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return a copy of it
    pub async fn append(
        &self,
        event_type: &str,
        severity: Severity,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> SecurityLogEntry {
        // Stamped under the write lock so stored order matches timestamp order
        let mut entries = self.entries.write().await;
        let entry = SecurityLogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            severity,
            message: message.to_string(),
            details,
        };
        entries.push(entry.clone());
        drop(entries);

        match severity {
            Severity::Info => info!(event_type, "[{}] {}", severity, message),
            Severity::Warning => warn!(event_type, "[{}] {}", severity, message),
            Severity::Error => error!(event_type, "[{}] {}", severity, message),
        }

        entry
    }

    /// Most recent `limit` entries, oldest first
    pub async fn tail(&self, limit: usize) -> Vec<SecurityLogEntry> {
        let entries = self.entries.read().await;
        let start = entries.len().saturating_sub(limit);
        entries[start..].to_vec()
    }

    /// Number of entries recorded so far
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if nothing has been recorded
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
