//! Proposal storage backends
//!
//! The store only talks to [`ProposalRepository`]; the in-memory backend is
//! the reference, the JSON file backend keeps a snapshot on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::types::TransactionProposal;

/// Storage for proposals, keyed by id, iterated in insertion order
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    /// Store a new proposal
    async fn insert(&self, proposal: TransactionProposal) -> Result<()>;

    /// Fetch a proposal by id
    async fn get(&self, id: &str) -> Result<Option<TransactionProposal>>;

    /// All proposals in insertion order
    async fn list(&self) -> Result<Vec<TransactionProposal>>;

    /// Replace an existing proposal
    async fn update(&self, proposal: TransactionProposal) -> Result<()>;
}

#[derive(Default)]
struct ProposalTable {
    order: Vec<String>,
    by_id: HashMap<String, TransactionProposal>,
}

impl ProposalTable {
    fn insert(&mut self, proposal: TransactionProposal) -> Result<()> {
        if self.by_id.contains_key(&proposal.id) {
            return Err(Error::Persistence(format!(
                "Duplicate proposal id: {}",
                proposal.id
            )));
        }
        self.order.push(proposal.id.clone());
        self.by_id.insert(proposal.id.clone(), proposal);
        Ok(())
    }

    fn update(&mut self, proposal: TransactionProposal) -> Result<()> {
        match self.by_id.get_mut(&proposal.id) {
            Some(slot) => {
                *slot = proposal;
                Ok(())
            }
            None => Err(Error::ProposalNotFound(proposal.id)),
        }
    }

    fn list(&self) -> Vec<TransactionProposal> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }
}

/// Map-backed repository living for the process lifetime
#[derive(Default)]
pub struct InMemoryProposalRepository {
    table: RwLock<ProposalTable>,
}

impl InMemoryProposalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_proposals(proposals: Vec<TransactionProposal>) -> Result<Self> {
        let mut table = ProposalTable::default();
        for proposal in proposals {
            table.insert(proposal)?;
        }
        Ok(Self {
            table: RwLock::new(table),
        })
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn insert(&self, proposal: TransactionProposal) -> Result<()> {
        self.table.write().await.insert(proposal)
    }

    async fn get(&self, id: &str) -> Result<Option<TransactionProposal>> {
        Ok(self.table.read().await.by_id.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<TransactionProposal>> {
        Ok(self.table.read().await.list())
    }

    async fn update(&self, proposal: TransactionProposal) -> Result<()> {
        self.table.write().await.update(proposal)
    }
}

/// On-disk snapshot format
#[derive(Debug, Serialize, Deserialize)]
struct ProposalSnapshot {
    #[serde(default = "default_version")]
    version: String,
    proposals: Vec<TransactionProposal>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// In-memory repository that writes a JSON snapshot after every mutation
///
/// Mutations are serialized and only reach memory once their snapshot is on
/// disk, so a failed write leaves both copies unchanged.
pub struct JsonFileProposalRepository {
    inner: InMemoryProposalRepository,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileProposalRepository {
    /// Open the snapshot at `path`, starting empty if it does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let inner = if path.exists() {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Persistence(format!("Failed to read {:?}: {}", path, e)))?;
            let snapshot: ProposalSnapshot = serde_json::from_str(&content)
                .map_err(|e| Error::Persistence(format!("Failed to parse {:?}: {}", path, e)))?;

            info!(
                "Loaded {} proposals from {:?}",
                snapshot.proposals.len(),
                path
            );
            InMemoryProposalRepository::from_proposals(snapshot.proposals)?
        } else {
            debug!("No proposal snapshot at {:?}, starting empty", path);
            InMemoryProposalRepository::new()
        };

        Ok(Self {
            inner,
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `proposals` as the new snapshot; caller holds `write_lock`
    async fn save(&self, proposals: Vec<TransactionProposal>) -> Result<()> {
        let snapshot = ProposalSnapshot {
            version: default_version(),
            proposals,
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Persistence(format!("Failed to serialize proposals: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write-then-rename so a crash never leaves a torn snapshot
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Persistence(format!(
                "Failed to write proposals: {}",
                e
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!("Failed to replace snapshot {:?}: {}", self.path, e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Persistence(format!(
                "Failed to replace snapshot: {}",
                e
            )));
        }

        debug!(
            "Saved {} proposals to {:?}",
            snapshot.proposals.len(),
            self.path
        );
        Ok(())
    }
}

#[async_trait]
impl ProposalRepository for JsonFileProposalRepository {
    async fn insert(&self, proposal: TransactionProposal) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut proposals = self.inner.list().await?;
        if proposals.iter().any(|p| p.id == proposal.id) {
            return Err(Error::Persistence(format!(
                "Duplicate proposal id: {}",
                proposal.id
            )));
        }
        proposals.push(proposal.clone());

        self.save(proposals).await?;
        self.inner.insert(proposal).await
    }

    async fn get(&self, id: &str) -> Result<Option<TransactionProposal>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<TransactionProposal>> {
        self.inner.list().await
    }

    async fn update(&self, proposal: TransactionProposal) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut proposals = self.inner.list().await?;
        match proposals.iter_mut().find(|p| p.id == proposal.id) {
            Some(slot) => *slot = proposal.clone(),
            None => return Err(Error::ProposalNotFound(proposal.id)),
        }

        self.save(proposals).await?;
        self.inner.update(proposal).await
    }
}
