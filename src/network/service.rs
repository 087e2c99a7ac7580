//! Ledger service interface

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::Result;

use super::types::{LedgerStatus, SignedTransaction, SubmitReceipt};

/// Distributed ledger that accepts signed transactions
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Submit a signed transaction
    ///
    /// Fails with `Error::Network` if the ledger rejects it or is unreachable.
    async fn submit(&self, transaction: &SignedTransaction) -> Result<SubmitReceipt>;

    /// Look up a previously submitted transaction
    ///
    /// Fails with `Error::LedgerNotFound` if the ledger has not seen `digest`.
    async fn query_status(&self, digest: &str) -> Result<LedgerStatus>;

    /// Spendable balance of `address`
    async fn balance(&self, address: &str) -> Result<Decimal>;
}
