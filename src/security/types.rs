//! Core types for policy configuration, risk assessment and auditing

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Overall security posture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityLevel::Low => write!(f, "low"),
            SecurityLevel::Medium => write!(f, "medium"),
            SecurityLevel::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(SecurityLevel::Low),
            "medium" => Ok(SecurityLevel::Medium),
            "high" => Ok(SecurityLevel::High),
            other => Err(crate::error::Error::Validation(format!(
                "Invalid security level: {}",
                other
            ))),
        }
    }
}

/// Process-wide policy configuration consulted by the risk engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Overall security posture
    #[serde(default = "default_security_level", alias = "security_level")]
    pub security_level: SecurityLevel,

    /// Amounts above this add to the risk score
    #[serde(default = "default_max_transaction_amount", alias = "max_transaction_amount")]
    pub max_transaction_amount: Decimal,

    /// Recipient allow-list (empty = no restriction)
    #[serde(default, alias = "allowed_addresses")]
    pub allowed_addresses: BTreeSet<String>,

    /// Execution should go through a physical hardware wallet
    #[serde(default = "default_true", alias = "require_hardware_wallet")]
    pub require_hardware_wallet: bool,

    /// Risk assessment is part of the review workflow
    #[serde(default = "default_true", alias = "enable_risk_assessment")]
    pub enable_risk_assessment: bool,

    /// Add the anomaly sub-score to every assessment
    #[serde(default = "default_true", alias = "enable_anomaly_detection")]
    pub enable_anomaly_detection: bool,
}

fn default_security_level() -> SecurityLevel {
    SecurityLevel::High
}

fn default_max_transaction_amount() -> Decimal {
    Decimal::from(10_000)
}

fn default_true() -> bool {
    true
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            security_level: default_security_level(),
            max_transaction_amount: default_max_transaction_amount(),
            allowed_addresses: BTreeSet::new(),
            require_hardware_wallet: true,
            enable_risk_assessment: true,
            enable_anomaly_detection: true,
        }
    }
}

impl SecurityConfig {
    /// Shallow-merge the fields present in `patch` over this config
    pub fn merge(&mut self, patch: SecurityConfigPatch) {
        if let Some(level) = patch.security_level {
            self.security_level = level;
        }
        if let Some(max) = patch.max_transaction_amount {
            self.max_transaction_amount = max;
        }
        if let Some(addresses) = patch.allowed_addresses {
            self.allowed_addresses = addresses;
        }
        if let Some(flag) = patch.require_hardware_wallet {
            self.require_hardware_wallet = flag;
        }
        if let Some(flag) = patch.enable_risk_assessment {
            self.enable_risk_assessment = flag;
        }
        if let Some(flag) = patch.enable_anomaly_detection {
            self.enable_anomaly_detection = flag;
        }
    }
}

/// Partial config update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<SecurityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_transaction_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_addresses: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_hardware_wallet: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_risk_assessment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_anomaly_detection: Option<bool>,
}

impl SecurityConfigPatch {
    /// True if the patch carries no fields
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Transaction under assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub amount: Decimal,
    pub recipient: String,
    pub proposer: String,
}

/// Risk bucket derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a score: low <30, medium <70, high otherwise
    pub fn from_score(score: u8) -> Self {
        if score < 30 {
            RiskLevel::Low
        } else if score < 70 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Result of scoring one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// 0 - 100
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub is_approved: bool,
}

/// Audit entry severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// One record in the security audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Findings of a static policy scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub vulnerabilities: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ScanResults {
    /// True if the scan found nothing to report
    pub fn is_clean(&self) -> bool {
        self.vulnerabilities.is_empty() && self.warnings.is_empty()
    }
}

/// Static policy scan report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub scan_id: String,
    pub timestamp: DateTime<Utc>,
    pub results: ScanResults,
}
