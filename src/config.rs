//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::security::{RecipientHistoryMode, SecurityConfig};
use crate::wallet::DEFAULT_DERIVATION_PATH;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Initial security policy
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub proposals: ProposalsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

/// Where signatures come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerMode {
    /// In-process device with placeholder cryptography
    #[default]
    Simulated,
    /// Physical devices over USB HID
    Hardware,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub mode: SignerMode,
    #[serde(default = "default_signing_timeout_ms")]
    pub signing_timeout_ms: u64,
    /// Seed for the simulated device (random if unset)
    #[serde(default)]
    pub simulated_seed: Option<String>,
    #[serde(default = "default_derivation_path")]
    pub derivation_path: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            mode: SignerMode::default(),
            signing_timeout_ms: default_signing_timeout_ms(),
            simulated_seed: None,
            derivation_path: default_derivation_path(),
        }
    }
}

/// Which ledger to submit to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    #[default]
    Simulated,
    Rpc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub mode: LedgerMode,
    /// Full-node JSON-RPC endpoint, required in rpc mode
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_ledger_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::default(),
            rpc_url: None,
            network: default_network(),
            timeout_ms: default_ledger_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalsConfig {
    /// Approve/reject only from Pending
    #[serde(default = "default_true")]
    pub strict_transitions: bool,
    /// JSON snapshot file; proposals stay in memory if unset
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
}

impl Default for ProposalsConfig {
    fn default() -> Self {
        Self {
            strict_transitions: true,
            persistence_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_tail_limit")]
    pub default_tail_limit: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_tail_limit: default_tail_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub recipient_history: RecipientHistoryMode,
}

fn default_true() -> bool {
    true
}

fn default_signing_timeout_ms() -> u64 {
    30_000
}

fn default_derivation_path() -> String {
    DEFAULT_DERIVATION_PATH.to_string()
}

fn default_network() -> String {
    "testnet".to_string()
}

fn default_ledger_timeout_ms() -> u64 {
    30_000
}

fn default_tail_limit() -> usize {
    100
}

fn default_persistence_path() -> String {
    "data/proposals.json".to_string()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("proposals.persistence_path", default_persistence_path())?
            .set_default("audit.default_tail_limit", default_tail_limit() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix AIRGAP__)
            .add_source(
                config::Environment::with_prefix("AIRGAP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.signer.signing_timeout_ms == 0 {
            anyhow::bail!("signer.signing_timeout_ms must be positive");
        }

        if self.ledger.timeout_ms == 0 {
            anyhow::bail!("ledger.timeout_ms must be positive");
        }

        if self.ledger.mode == LedgerMode::Rpc
            && self.ledger.rpc_url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("ledger.rpc_url is required when ledger.mode = \"rpc\"");
        }

        if self.audit.default_tail_limit == 0 {
            anyhow::bail!("audit.default_tail_limit must be positive");
        }

        if self.signer.derivation_path.trim().is_empty() {
            anyhow::bail!("signer.derivation_path cannot be empty");
        }

        // Warn about a policy the coordinator cannot enforce
        if self.security.require_hardware_wallet && self.signer.mode == SignerMode::Simulated {
            tracing::warn!(
                "security.require_hardware_wallet is set but signer.mode is 'simulated' - executions will be flagged in the audit log"
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Security:
    level: {}
    max_transaction_amount: {}
    allowed_addresses: {}
    require_hardware_wallet: {}
  Signer:
    mode: {:?}
    signing_timeout: {}ms
    derivation_path: {}
  Ledger:
    mode: {:?}
    network: {}
    rpc_url: {}
    timeout: {}ms
  Proposals:
    strict_transitions: {}
    persistence: {}
  Risk:
    recipient_history: {:?}
"#,
            self.security.security_level,
            self.security.max_transaction_amount,
            self.security.allowed_addresses.len(),
            self.security.require_hardware_wallet,
            self.signer.mode,
            self.signer.signing_timeout_ms,
            self.signer.derivation_path,
            self.ledger.mode,
            self.ledger.network,
            self.ledger
                .rpc_url
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(not set)".to_string()),
            self.ledger.timeout_ms,
            self.proposals.strict_transitions,
            self.proposals
                .persistence_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(in memory)".to_string()),
            self.risk.recipient_history,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityLevel;
    use rust_decimal::Decimal;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.signer.mode, SignerMode::Simulated);
        assert_eq!(config.signer.signing_timeout_ms, 30_000);
        assert_eq!(config.ledger.mode, LedgerMode::Simulated);
        assert!(config.proposals.strict_transitions);
        assert_eq!(config.audit.default_tail_limit, 100);
        assert_eq!(config.security.security_level, SecurityLevel::High);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[security]
security_level = "medium"
max_transaction_amount = "2500"
allowed_addresses = ["0xdef"]

[signer]
simulated_seed = "demo"

[proposals]
strict_transitions = false

[risk]
recipient_history = "observed"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.security.security_level, SecurityLevel::Medium);
        assert_eq!(config.security.max_transaction_amount, Decimal::from(2500));
        assert!(config.security.allowed_addresses.contains("0xdef"));
        assert_eq!(config.signer.simulated_seed.as_deref(), Some("demo"));
        assert!(!config.proposals.strict_transitions);
        assert_eq!(
            config.proposals.persistence_path,
            Some(PathBuf::from("data/proposals.json"))
        );
        assert_eq!(config.risk.recipient_history, RecipientHistoryMode::Observed);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.ledger.mode = LedgerMode::Rpc;
        assert!(config.validate().is_err());

        config.ledger.rpc_url = Some("https://fullnode.testnet.sui.io:443".to_string());
        assert!(config.validate().is_ok());

        config.signer.signing_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audit.default_tail_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }
}
