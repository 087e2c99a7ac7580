//! Recipient history used by anomaly detection
//!
//! Decides whether a recipient counts as previously unseen.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;

/// Predicate for the "unseen recipient" anomaly signal
pub trait RecipientHistory: Send + Sync {
    /// True if `recipient` has no prior history
    fn is_unseen(&self, recipient: &str) -> bool;

    /// Remember that funds were sent to `recipient`
    fn record(&self, recipient: &str);
}

/// Treats every recipient as new
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysUnseen;

impl RecipientHistory for AlwaysUnseen {
    fn is_unseen(&self, _recipient: &str) -> bool {
        true
    }

    fn record(&self, _recipient: &str) {}
}

/// Recipients observed in executed transfers
#[derive(Debug, Default)]
pub struct ObservedRecipients {
    seen: DashMap<String, DateTime<Utc>>,
}

impl ObservedRecipients {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `recipient` was last paid, if ever
    pub fn last_seen(&self, recipient: &str) -> Option<DateTime<Utc>> {
        self.seen.get(recipient).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl RecipientHistory for ObservedRecipients {
    fn is_unseen(&self, recipient: &str) -> bool {
        !self.seen.contains_key(recipient)
    }

    fn record(&self, recipient: &str) {
        self.seen.insert(recipient.to_string(), Utc::now());
    }
}

/// Which recipient history policy to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientHistoryMode {
    #[default]
    AlwaysUnseen,
    Observed,
}

impl RecipientHistoryMode {
    /// Build the history policy for this mode
    pub fn build(self) -> Arc<dyn RecipientHistory> {
        match self {
            RecipientHistoryMode::AlwaysUnseen => Arc::new(AlwaysUnseen),
            RecipientHistoryMode::Observed => Arc::new(ObservedRecipients::new()),
        }
    }
}
