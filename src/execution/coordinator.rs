//! Execution coordinator
//!
//! Drives one approved proposal through signing and submission:
//!
//! ```text
//! reserve ─► resolve device ─► encode payload ─► sign ─► submit ─► complete
//!    │                                            (timeout)  (timeout)
//!    └── reservation dropped on signing or submission failure: proposal
//!        stays Approved
//! ```
//!
//! Once the ledger has accepted a transaction the proposal is never offered
//! for execution again, even if storing the Executed state fails.
//!
//! No proposal lock is held while the device or the ledger is working.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::network::{LedgerService, LedgerTxStatus, SignedTransaction};
use crate::proposal::{ProposalStore, TransactionProposal};
use crate::security::{SecurityService, Severity};
use crate::wallet::{SignRequest, WalletSessionRegistry, DEFAULT_DERIVATION_PATH};

use super::types::{ExecutionReceipt, TransactionPayload, TransactionStatusReport};

/// Timeouts and signing path for executions
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Upper bound on waiting for the device
    pub signing_timeout: Duration,

    /// Upper bound on a ledger submission
    pub ledger_timeout: Duration,

    /// Account path to sign with
    pub derivation_path: String,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            signing_timeout: Duration::from_secs(30),
            ledger_timeout: Duration::from_secs(30),
            derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
        }
    }
}

/// Executes approved proposals exactly once
pub struct ExecutionCoordinator {
    proposals: Arc<ProposalStore>,
    wallets: Arc<WalletSessionRegistry>,
    ledger: Arc<dyn LedgerService>,
    security: Arc<SecurityService>,
    settings: ExecutionSettings,
}

impl ExecutionCoordinator {
    pub fn new(
        proposals: Arc<ProposalStore>,
        wallets: Arc<WalletSessionRegistry>,
        ledger: Arc<dyn LedgerService>,
        security: Arc<SecurityService>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            proposals,
            wallets,
            ledger,
            security,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Sign an approved proposal on `device_id` and submit it
    ///
    /// Fails with `ProposalNotFound`, `InvalidState` (not Approved, or an
    /// execution is already in flight), `DeviceNotFound`, `Signing`,
    /// `Network`, `Rpc` or `Timeout`, after which the proposal stays Approved.
    /// A storage failure after submission leaves the proposal blocked with its
    /// digest held by the store; see [`Self::record_submitted`].
    pub async fn execute(&self, proposal_id: &str, device_id: &str) -> Result<ExecutionReceipt> {
        let reservation = self.proposals.reserve_for_execution(proposal_id).await?;
        let recipient = reservation.proposal().recipient.clone();
        let outcome = self
            .sign_and_submit(reservation.proposal(), device_id)
            .await;

        let (transaction, digest) = match outcome {
            Ok(submitted) => submitted,
            Err(e) => {
                drop(reservation);
                warn!("Execution of proposal {} failed: {}", proposal_id, e);
                self.security
                    .record_event(
                        "execution_failed",
                        Severity::Error,
                        &format!("Execution failed: {}", e),
                        Some(json!({ "proposalId": proposal_id, "deviceId": device_id })),
                    )
                    .await;
                return Err(e);
            }
        };

        // The ledger has the transaction from here on
        self.security.risk_engine().history().record(&recipient);

        let executed = match self
            .proposals
            .complete_execution(reservation, digest.clone())
            .await
        {
            Ok(executed) => executed,
            Err(e) => {
                error!(
                    "Ledger accepted {} but proposal {} could not be marked executed: {}",
                    digest, proposal_id, e
                );
                self.security
                    .record_event(
                        "execution_unrecorded",
                        Severity::Error,
                        &format!("Transaction submitted but not recorded: {}", e),
                        Some(json!({
                            "proposalId": proposal_id,
                            "deviceId": device_id,
                            "transactionId": digest,
                        })),
                    )
                    .await;
                return Err(e);
            }
        };

        self.security
            .record_event(
                "transaction_executed",
                Severity::Info,
                "Transaction executed",
                Some(json!({
                    "proposalId": executed.id,
                    "deviceId": device_id,
                    "transactionId": digest,
                    "amount": executed.amount,
                    "recipient": executed.recipient,
                })),
            )
            .await;

        Ok(ExecutionReceipt {
            transaction_id: digest,
            proposal_id: executed.id,
            status: LedgerTxStatus::Success,
            timestamp: Utc::now(),
            signature: transaction.signature,
            public_key: transaction.public_key,
            signed_payload: hex::encode(&transaction.transaction_bytes),
            derivation_path: self.settings.derivation_path.clone(),
        })
    }

    /// Store the Executed state of a proposal the ledger already accepted
    pub async fn record_submitted(&self, proposal_id: &str) -> Result<TransactionProposal> {
        let executed = self.proposals.retry_completion(proposal_id).await?;
        self.security
            .record_event(
                "transaction_executed",
                Severity::Info,
                "Submitted transaction recorded",
                Some(json!({
                    "proposalId": executed.id,
                    "transactionId": executed.transaction_digest,
                })),
            )
            .await;
        Ok(executed)
    }

    /// Steps between reservation and completion; returns what was submitted
    /// and the ledger digest
    async fn sign_and_submit(
        &self,
        proposal: &TransactionProposal,
        device_id: &str,
    ) -> Result<(SignedTransaction, String)> {
        let proposal_id = proposal.id.as_str();
        let signer = self.wallets.signer(device_id).await?;
        let session = self.wallets.session(device_id).await?;

        if signer.is_simulated() && self.security.config().await.require_hardware_wallet {
            self.security
                .record_event(
                    "simulated_signer_used",
                    Severity::Warning,
                    "Hardware wallet required but a simulated signer is in use",
                    Some(json!({ "proposalId": proposal_id, "deviceId": device_id })),
                )
                .await;
        }

        let payload = TransactionPayload::for_proposal(proposal, &session.address);
        let transaction_bytes = payload.encode()?;

        info!(
            "Signing proposal {} ({} to {}) on {}",
            proposal_id, proposal.amount, proposal.recipient, device_id
        );

        let request = SignRequest {
            transaction_bytes: transaction_bytes.clone(),
            derivation_path: self.settings.derivation_path.clone(),
        };
        let signed = with_timeout("signing", self.settings.signing_timeout, signer.sign(&request))
            .await?;

        let transaction = SignedTransaction {
            transaction_bytes,
            signature: signed.signature,
            public_key: signed.public_key,
        };
        let receipt = with_timeout(
            "ledger submission",
            self.settings.ledger_timeout,
            self.ledger.submit(&transaction),
        )
        .await?;

        info!(
            "Ledger {} accepted proposal {} as {}",
            self.ledger.name(),
            proposal_id,
            receipt.digest
        );
        Ok((transaction, receipt.digest))
    }

    /// Ledger status of a digest; unknown digests report as pending
    pub async fn transaction_status(&self, digest: &str) -> Result<TransactionStatusReport> {
        let (status, details) = match self.ledger.query_status(digest).await {
            Ok(found) => (found.status, found.details),
            Err(Error::LedgerNotFound(_)) => (
                LedgerTxStatus::Pending,
                Some(json!({ "message": "Transaction not yet known to the ledger" })),
            ),
            Err(e) => return Err(e),
        };

        Ok(TransactionStatusReport {
            transaction_id: digest.to_string(),
            status,
            timestamp: Utc::now(),
            details,
        })
    }

    /// Ledger status of an executed proposal
    pub async fn proposal_status(&self, proposal_id: &str) -> Result<TransactionStatusReport> {
        let proposal = self.proposals.get(proposal_id).await?;
        let digest = proposal
            .transaction_digest
            .or_else(|| self.proposals.unrecorded_digest(proposal_id))
            .ok_or_else(|| {
                Error::InvalidState(format!(
                    "Proposal {} has not been executed (status: {})",
                    proposal_id, proposal.status
                ))
            })?;
        self.transaction_status(&digest).await
    }
}

async fn with_timeout<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout {
            operation: operation.to_string(),
            ms: limit.as_millis() as u64,
        })?
}
