//! Proposal store - owns the proposal state machine
//!
//! Every check-and-transition runs under a per-proposal mutex. Execution
//! reserves a proposal under that mutex, releases it for the slow signing and
//! submission calls, then takes it again to record the result. If that last
//! write fails the ledger digest is kept aside and the proposal stays blocked
//! until [`ProposalStore::retry_completion`] stores it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::repository::{InMemoryProposalRepository, ProposalRepository};
use super::types::{ProposalDraft, ProposalStatus, TransactionProposal};

/// Proposal state machine over a pluggable repository
pub struct ProposalStore {
    repo: Arc<dyn ProposalRepository>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    in_flight: Arc<DashMap<String, DateTime<Utc>>>,
    /// Digests accepted by the ledger whose Executed state was not stored
    unrecorded: DashMap<String, String>,
    strict_transitions: bool,
}

impl ProposalStore {
    /// Create a store over `repo`
    ///
    /// With `strict_transitions` off, approve/reject also flip Approved and
    /// Rejected proposals. Executed proposals never change in either mode.
    pub fn new(repo: Arc<dyn ProposalRepository>, strict_transitions: bool) -> Self {
        Self {
            repo,
            locks: DashMap::new(),
            in_flight: Arc::new(DashMap::new()),
            unrecorded: DashMap::new(),
            strict_transitions,
        }
    }

    /// Strict store over a fresh in-memory repository
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryProposalRepository::new()), true)
    }

    /// Record a new pending proposal
    pub async fn create(&self, draft: ProposalDraft) -> Result<TransactionProposal> {
        let proposal = TransactionProposal::from_draft(draft);
        self.repo.insert(proposal.clone()).await?;

        info!(
            "Created proposal {}: {} to {} (by {})",
            proposal.id, proposal.amount, proposal.recipient, proposal.proposer
        );
        Ok(proposal)
    }

    /// Fetch a proposal
    pub async fn get(&self, id: &str) -> Result<TransactionProposal> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| Error::ProposalNotFound(id.to_string()))
    }

    /// All proposals in creation order
    pub async fn list_all(&self) -> Result<Vec<TransactionProposal>> {
        self.repo.list().await
    }

    /// Approve a proposal
    pub async fn approve(&self, id: &str) -> Result<TransactionProposal> {
        let proposal = self
            .transition(id, |p| self.review(p, ProposalStatus::Approved))
            .await?;
        info!("Approved proposal: {}", id);
        Ok(proposal)
    }

    /// Reject a proposal
    pub async fn reject(&self, id: &str) -> Result<TransactionProposal> {
        let proposal = self
            .transition(id, |p| self.review(p, ProposalStatus::Rejected))
            .await?;
        info!("Rejected proposal: {}", id);
        Ok(proposal)
    }

    /// True while an execution holds a reservation on `id`
    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Ledger digest of a submitted proposal whose completion was not stored
    pub fn unrecorded_digest(&self, id: &str) -> Option<String> {
        self.unrecorded.get(id).map(|entry| entry.value().clone())
    }

    /// Claim an approved proposal for execution
    ///
    /// Fails with `ProposalNotFound` if unknown and `InvalidState` unless the
    /// proposal is Approved with no other execution in flight.
    pub async fn reserve_for_execution(&self, id: &str) -> Result<ExecutionReservation> {
        let lock = self.lock_for(id).await?;
        let _guard = lock.lock().await;

        let proposal = self.get(id).await?;
        if let Some(digest) = self.unrecorded_digest(id) {
            return Err(Error::InvalidState(format!(
                "Proposal {} was already submitted as {}",
                id, digest
            )));
        }
        match proposal.status {
            ProposalStatus::Approved => {}
            ProposalStatus::Executed => {
                return Err(Error::InvalidState(format!(
                    "Proposal {} has already been executed",
                    id
                )));
            }
            other => {
                return Err(Error::InvalidState(format!(
                    "Proposal {} must be approved before execution (status: {})",
                    id, other
                )));
            }
        }

        if self.in_flight.contains_key(id) {
            return Err(Error::InvalidState(format!(
                "Proposal {} is already being executed",
                id
            )));
        }

        self.in_flight.insert(id.to_string(), Utc::now());
        debug!("Reserved proposal {} for execution", id);

        Ok(ExecutionReservation {
            proposal,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Mark a reserved proposal Executed with the ledger digest
    ///
    /// On failure the digest is kept as unrecorded, so the proposal can no
    /// longer be reserved or reviewed.
    pub async fn complete_execution(
        &self,
        reservation: ExecutionReservation,
        digest: String,
    ) -> Result<TransactionProposal> {
        let id = reservation.proposal.id.clone();
        let result = self.mark_executed(&id, digest.clone()).await;

        if result.is_err() {
            self.unrecorded.insert(id, digest);
        }

        // The reservation is released only once the outcome is recorded
        drop(reservation);
        result
    }

    /// Store the Executed state of a proposal whose completion failed
    pub async fn retry_completion(&self, id: &str) -> Result<TransactionProposal> {
        let digest = self.unrecorded_digest(id).ok_or_else(|| {
            Error::InvalidState(format!("Proposal {} has no unrecorded submission", id))
        })?;

        let proposal = self.mark_executed(id, digest).await?;
        self.unrecorded.remove(id);
        info!("Recorded execution of proposal {}", id);
        Ok(proposal)
    }

    async fn mark_executed(&self, id: &str, digest: String) -> Result<TransactionProposal> {
        self.transition(id, move |p| {
            if p.status != ProposalStatus::Approved {
                return Err(Error::InvalidState(format!(
                    "Proposal {} left Approved during execution (status: {})",
                    p.id, p.status
                )));
            }
            p.status = ProposalStatus::Executed;
            p.transaction_digest = Some(digest);
            Ok(())
        })
        .await
    }

    fn review(&self, proposal: &mut TransactionProposal, target: ProposalStatus) -> Result<()> {
        if self.in_flight.contains_key(&proposal.id) || self.unrecorded.contains_key(&proposal.id)
        {
            return Err(Error::InvalidState(format!(
                "Proposal {} is being executed",
                proposal.id
            )));
        }

        match proposal.status {
            ProposalStatus::Pending => {}
            ProposalStatus::Executed => {
                return Err(Error::InvalidState(format!(
                    "Proposal {} has already been executed",
                    proposal.id
                )));
            }
            _ if !self.strict_transitions => {}
            current => {
                return Err(Error::InvalidState(format!(
                    "Proposal {} cannot become {} from {}",
                    proposal.id, target, current
                )));
            }
        }

        proposal.status = target;
        Ok(())
    }

    async fn transition<F>(&self, id: &str, apply: F) -> Result<TransactionProposal>
    where
        F: FnOnce(&mut TransactionProposal) -> Result<()>,
    {
        let lock = self.lock_for(id).await?;
        let _guard = lock.lock().await;

        let mut proposal = self.get(id).await?;
        apply(&mut proposal)?;
        proposal.updated_at = Utc::now();

        self.repo.update(proposal.clone()).await?;
        Ok(proposal)
    }

    /// Mutex for an existing proposal; unknown ids never get an entry
    async fn lock_for(&self, id: &str) -> Result<Arc<Mutex<()>>> {
        if let Some(lock) = self.locks.get(id) {
            return Ok(lock.value().clone());
        }

        self.get(id).await?;
        Ok(self.locks.entry(id.to_string()).or_default().clone())
    }
}

/// Claim on an approved proposal held for the duration of one execution
///
/// Dropping it without completing (error, timeout, cancelled future) leaves
/// the proposal Approved and free to be executed again.
pub struct ExecutionReservation {
    proposal: TransactionProposal,
    in_flight: Arc<DashMap<String, DateTime<Utc>>>,
}

impl ExecutionReservation {
    /// Snapshot of the proposal taken when it was reserved
    pub fn proposal(&self) -> &TransactionProposal {
        &self.proposal
    }
}

impl Drop for ExecutionReservation {
    fn drop(&mut self) {
        self.in_flight.remove(&self.proposal.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn draft() -> ProposalDraft {
        ProposalDraft::new(Decimal::from(5), "0x1", "alice")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = ProposalStore::in_memory();
        let created = store.create(draft()).await.unwrap();

        assert_eq!(created.status, ProposalStatus::Pending);
        let first = store.get(&created.id).await.unwrap();
        let second = store.get(&created.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, created);
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let store = ProposalStore::in_memory();
        assert!(matches!(
            store.get("nope").await,
            Err(Error::ProposalNotFound(_))
        ));
        assert!(matches!(
            store.approve("nope").await,
            Err(Error::ProposalNotFound(_))
        ));
        assert!(matches!(
            store.reject("nope").await,
            Err(Error::ProposalNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_bumps_updated_at() {
        let store = ProposalStore::in_memory();
        let created = store.create(draft()).await.unwrap();

        let approved = store.approve(&created.id).await.unwrap();
        assert_eq!(approved.status, ProposalStatus::Approved);
        assert!(approved.updated_at >= created.updated_at);
        assert_eq!(approved.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_strict_mode_blocks_re_review() {
        let store = ProposalStore::in_memory();
        let id = store.create(draft()).await.unwrap().id;

        store.reject(&id).await.unwrap();
        assert!(matches!(
            store.approve(&id).await,
            Err(Error::InvalidState(_))
        ));
        assert_eq!(
            store.get(&id).await.unwrap().status,
            ProposalStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_lenient_mode_flips_but_never_leaves_executed() {
        let store = ProposalStore::new(Arc::new(InMemoryProposalRepository::new()), false);
        let id = store.create(draft()).await.unwrap().id;

        store.reject(&id).await.unwrap();
        let flipped = store.approve(&id).await.unwrap();
        assert_eq!(flipped.status, ProposalStatus::Approved);

        let reservation = store.reserve_for_execution(&id).await.unwrap();
        store
            .complete_execution(reservation, "D1".to_string())
            .await
            .unwrap();

        assert!(matches!(
            store.reject(&id).await,
            Err(Error::InvalidState(_))
        ));
        let executed = store.get(&id).await.unwrap();
        assert_eq!(executed.status, ProposalStatus::Executed);
        assert_eq!(executed.transaction_digest.as_deref(), Some("D1"));
    }

    #[tokio::test]
    async fn test_reserve_requires_approved() {
        let store = ProposalStore::in_memory();
        let id = store.create(draft()).await.unwrap().id;

        assert!(matches!(
            store.reserve_for_execution(&id).await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            store.reserve_for_execution("missing").await,
            Err(Error::ProposalNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reservation_is_exclusive_and_released_on_drop() {
        let store = ProposalStore::in_memory();
        let id = store.create(draft()).await.unwrap().id;
        store.approve(&id).await.unwrap();

        let reservation = store.reserve_for_execution(&id).await.unwrap();
        assert!(store.is_in_flight(&id));
        assert!(matches!(
            store.reserve_for_execution(&id).await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            store.reject(&id).await,
            Err(Error::InvalidState(_))
        ));

        drop(reservation);
        assert!(!store.is_in_flight(&id));
        assert_eq!(
            store.get(&id).await.unwrap().status,
            ProposalStatus::Approved
        );
        assert!(store.reserve_for_execution(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_digest_set_only_when_executed() {
        let store = ProposalStore::in_memory();
        let id = store.create(draft()).await.unwrap().id;

        let approved = store.approve(&id).await.unwrap();
        assert!(approved.transaction_digest.is_none());

        let reservation = store.reserve_for_execution(&id).await.unwrap();
        let executed = store
            .complete_execution(reservation, "D1".to_string())
            .await
            .unwrap();
        assert_eq!(executed.status, ProposalStatus::Executed);
        assert_eq!(executed.transaction_digest.as_deref(), Some("D1"));
        assert!(!store.is_in_flight(&id));

        assert!(matches!(
            store.reserve_for_execution(&id).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_lock_entries() {
        let store = ProposalStore::in_memory();
        for i in 0..10 {
            let id = format!("missing-{}", i);
            assert!(store.approve(&id).await.is_err());
            assert!(store.reject(&id).await.is_err());
            assert!(store.reserve_for_execution(&id).await.is_err());
        }
        assert_eq!(store.locks.len(), 0);

        let id = store.create(draft()).await.unwrap().id;
        store.approve(&id).await.unwrap();
        assert_eq!(store.locks.len(), 1);
    }

    /// Repository whose updates can be switched off
    struct FlakyRepository {
        inner: InMemoryProposalRepository,
        fail_updates: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl ProposalRepository for FlakyRepository {
        async fn insert(&self, proposal: TransactionProposal) -> Result<()> {
            self.inner.insert(proposal).await
        }

        async fn get(&self, id: &str) -> Result<Option<TransactionProposal>> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Result<Vec<TransactionProposal>> {
            self.inner.list().await
        }

        async fn update(&self, proposal: TransactionProposal) -> Result<()> {
            if self.fail_updates.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Persistence("disk full".to_string()));
            }
            self.inner.update(proposal).await
        }
    }

    #[tokio::test]
    async fn test_failed_completion_blocks_until_recorded() {
        let repo = Arc::new(FlakyRepository {
            inner: InMemoryProposalRepository::new(),
            fail_updates: std::sync::atomic::AtomicBool::new(false),
        });
        let store = ProposalStore::new(repo.clone(), true);
        let id = store.create(draft()).await.unwrap().id;
        store.approve(&id).await.unwrap();

        let reservation = store.reserve_for_execution(&id).await.unwrap();
        repo.fail_updates
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(
            store.complete_execution(reservation, "D1".to_string()).await,
            Err(Error::Persistence(_))
        ));

        assert!(!store.is_in_flight(&id));
        assert_eq!(store.unrecorded_digest(&id).as_deref(), Some("D1"));
        assert!(matches!(
            store.reserve_for_execution(&id).await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            store.reject(&id).await,
            Err(Error::InvalidState(_))
        ));

        assert!(store.retry_completion(&id).await.is_err());
        repo.fail_updates
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let executed = store.retry_completion(&id).await.unwrap();
        assert_eq!(executed.status, ProposalStatus::Executed);
        assert_eq!(executed.transaction_digest.as_deref(), Some("D1"));
        assert!(store.unrecorded_digest(&id).is_none());
    }

    #[tokio::test]
    async fn test_list_all_in_creation_order() {
        let store = ProposalStore::in_memory();
        let a = store.create(draft()).await.unwrap();
        let b = store.create(draft()).await.unwrap();
        store.approve(&a.id).await.unwrap();

        let ids: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }
}
