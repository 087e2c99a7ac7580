//! Service wiring
//!
//! Builds every service from a [`Config`] and hands out shared handles.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::info;

use crate::config::{Config, LedgerMode, SignerMode};
use crate::error::{Error, Result};
use crate::execution::{ExecutionCoordinator, ExecutionSettings};
use crate::network::{LedgerService, RpcLedgerClient, SimulatedLedger};
use crate::proposal::{
    InMemoryProposalRepository, JsonFileProposalRepository, ProposalDraft, ProposalRepository,
    ProposalStore, TransactionProposal,
};
use crate::security::{RiskAssessment, SecurityService};
use crate::wallet::{SignerTable, SimulatedDevice, WalletSessionRegistry};

/// Fully wired service graph
pub struct App {
    pub config: Config,
    pub security: Arc<SecurityService>,
    pub proposals: Arc<ProposalStore>,
    pub wallets: Arc<WalletSessionRegistry>,
    pub ledger: Arc<dyn LedgerService>,
    pub coordinator: Arc<ExecutionCoordinator>,
    /// Present in simulated signer mode
    pub simulated_device: Option<Arc<SimulatedDevice>>,
}

impl App {
    /// Build all services described by `config`
    pub async fn from_config(config: Config) -> Result<Self> {
        let security = Arc::new(SecurityService::new(
            config.security.clone(),
            config.risk.recipient_history.build(),
        ));

        let repo: Arc<dyn ProposalRepository> = match &config.proposals.persistence_path {
            Some(path) => Arc::new(JsonFileProposalRepository::open(path).await?),
            None => Arc::new(InMemoryProposalRepository::new()),
        };
        let proposals = Arc::new(ProposalStore::new(
            repo,
            config.proposals.strict_transitions,
        ));

        let (signers, simulated_device) = match config.signer.mode {
            SignerMode::Simulated => {
                let device = Arc::new(match &config.signer.simulated_seed {
                    Some(seed) => SimulatedDevice::from_seed(seed),
                    None => SimulatedDevice::random(),
                });
                (SignerTable::simulated(device.clone()), Some(device))
            }
            SignerMode::Hardware => (SignerTable::hardware(), None),
        };
        let wallets = Arc::new(WalletSessionRegistry::new(signers));

        let ledger_timeout = Duration::from_millis(config.ledger.timeout_ms);
        let ledger: Arc<dyn LedgerService> = match config.ledger.mode {
            LedgerMode::Simulated => Arc::new(SimulatedLedger::new()),
            LedgerMode::Rpc => {
                let url = config.ledger.rpc_url.as_deref().ok_or_else(|| {
                    Error::Config("ledger.rpc_url is required in rpc mode".to_string())
                })?;
                Arc::new(RpcLedgerClient::new(
                    url,
                    &config.ledger.network,
                    ledger_timeout,
                )?)
            }
        };

        let settings = ExecutionSettings {
            signing_timeout: Duration::from_millis(config.signer.signing_timeout_ms),
            ledger_timeout,
            derivation_path: config.signer.derivation_path.clone(),
        };
        let coordinator = Arc::new(ExecutionCoordinator::new(
            proposals.clone(),
            wallets.clone(),
            ledger.clone(),
            security.clone(),
            settings,
        ));

        info!(
            "Vault ready (signer: {:?}, ledger: {})",
            config.signer.mode,
            ledger.name()
        );

        Ok(Self {
            config,
            security,
            proposals,
            wallets,
            ledger,
            coordinator,
            simulated_device,
        })
    }

    /// Validate and record a draft, with an advisory risk assessment
    ///
    /// The assessment is skipped when risk assessment is disabled in the
    /// policy; it never blocks creation.
    pub async fn create_proposal(
        &self,
        draft: ProposalDraft,
    ) -> Result<(TransactionProposal, Option<RiskAssessment>)> {
        draft.validate()?;
        let proposal = self.proposals.create(draft).await?;

        let assessment = if self.security.config().await.enable_risk_assessment {
            Some(self.security.assess(&proposal.as_request()).await)
        } else {
            None
        };

        Ok((proposal, assessment))
    }

    /// Ledger balance of a connected device's account
    pub async fn wallet_balance(&self, device_id: &str) -> Result<Decimal> {
        let session = self.wallets.session(device_id).await?;
        self.ledger.balance(&session.address).await
    }

    /// Audit tail length used when the caller gives none
    pub fn default_log_limit(&self) -> usize {
        self.config.audit.default_tail_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::WalletType;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.signer.simulated_seed = Some("app".to_string());
        config
    }

    #[tokio::test]
    async fn test_from_default_config() {
        let app = App::from_config(test_config()).await.unwrap();
        assert!(app.simulated_device.is_some());
        assert_eq!(app.ledger.name(), "simulated");
        assert_eq!(app.default_log_limit(), 100);
    }

    #[tokio::test]
    async fn test_create_proposal_validates_and_assesses() {
        let app = App::from_config(test_config()).await.unwrap();

        let invalid = app
            .create_proposal(ProposalDraft::new(Decimal::ONE, "", "alice"))
            .await;
        assert!(matches!(invalid, Err(Error::Validation(_))));
        assert!(app.proposals.list_all().await.unwrap().is_empty());

        let (proposal, assessment) = app
            .create_proposal(ProposalDraft::new(Decimal::from(50), "0xbob", "alice"))
            .await
            .unwrap();
        assert_eq!(app.proposals.get(&proposal.id).await.unwrap(), proposal);
        assert_eq!(assessment.unwrap().risk_score, 20);
    }

    #[tokio::test]
    async fn test_hardware_mode_cannot_connect() {
        let mut config = test_config();
        config.signer.mode = SignerMode::Hardware;
        let app = App::from_config(config).await.unwrap();

        assert!(app.simulated_device.is_none());
        assert!(matches!(
            app.wallets.connect(WalletType::Ledger).await,
            Err(Error::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_wallet_balance() {
        let app = App::from_config(test_config()).await.unwrap();
        let session = app.wallets.connect(WalletType::Trezor).await.unwrap();

        assert_eq!(
            app.wallet_balance(&session.device_id).await.unwrap(),
            Decimal::ZERO
        );
        assert!(matches!(
            app.wallet_balance("trezormissing1").await,
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_json_persistence_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.proposals.persistence_path = Some(dir.path().join("proposals.json"));

        let id = {
            let app = App::from_config(config.clone()).await.unwrap();
            let (proposal, _) = app
                .create_proposal(ProposalDraft::new(Decimal::from(3), "0xbob", "alice"))
                .await
                .unwrap();
            app.proposals.approve(&proposal.id).await.unwrap();
            proposal.id
        };

        let app = App::from_config(config).await.unwrap();
        let reloaded = app.proposals.get(&id).await.unwrap();
        assert_eq!(reloaded.status, crate::proposal::ProposalStatus::Approved);
    }
}
