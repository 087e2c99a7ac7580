//! In-process ledger used in simulated mode and tests

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::service::LedgerService;
use super::types::{LedgerStatus, LedgerTxStatus, SignedTransaction, SubmitReceipt};

/// Ledger that accepts everything unless told to reject
///
/// Digests are the hex SHA-256 of the signed bytes, so resubmitting the same
/// signed transaction is idempotent.
#[derive(Default)]
pub struct SimulatedLedger {
    transactions: DashMap<String, LedgerTxStatus>,
    balances: DashMap<String, Decimal>,
    reject: AtomicBool,
    submit_delay_ms: AtomicU64,
    submissions: AtomicUsize,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following submission fail with `Error::Network`
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Delay each submission
    pub fn set_submit_delay(&self, delay: Duration) {
        self.submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_balance(&self, address: &str, amount: Decimal) {
        self.balances.insert(address.to_string(), amount);
    }

    /// Submission attempts that reached the ledger, accepted or not
    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Digests accepted so far
    pub fn accepted_count(&self) -> usize {
        self.transactions.len()
    }
}

#[async_trait]
impl LedgerService for SimulatedLedger {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<SubmitReceipt> {
        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.submissions.fetch_add(1, Ordering::SeqCst);

        if self.reject.load(Ordering::SeqCst) {
            warn!("Simulated ledger rejected transaction");
            return Err(Error::Network("Ledger rejected transaction".to_string()));
        }

        let digest = transaction.content_digest();
        self.transactions
            .insert(digest.clone(), LedgerTxStatus::Success);
        debug!("Simulated ledger accepted {}", digest);

        Ok(SubmitReceipt { digest })
    }

    async fn query_status(&self, digest: &str) -> Result<LedgerStatus> {
        let status = self
            .transactions
            .get(digest)
            .map(|entry| *entry.value())
            .ok_or_else(|| Error::LedgerNotFound(digest.to_string()))?;

        Ok(LedgerStatus {
            status,
            details: Some(json!({ "ledger": "simulated", "digest": digest })),
        })
    }

    async fn balance(&self, address: &str) -> Result<Decimal> {
        Ok(self
            .balances
            .get(address)
            .map(|entry| *entry.value())
            .unwrap_or(Decimal::ZERO))
    }
}
