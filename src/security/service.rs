//! Security service - the risk policy surface
//!
//! Bundles the config store, audit log and risk engine, and adds the static
//! policy scan and recommendations.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::audit::SecurityAuditLog;
use super::config_store::SecurityConfigStore;
use super::history::RecipientHistory;
use super::risk::RiskEngine;
use super::types::{
    RiskAssessment, ScanReport, ScanResults, SecurityConfig, SecurityConfigPatch, SecurityLevel,
    SecurityLogEntry, Severity, TransactionRequest,
};

/// Security policy facade
pub struct SecurityService {
    config: Arc<SecurityConfigStore>,
    audit: Arc<SecurityAuditLog>,
    risk: RiskEngine,
}

impl SecurityService {
    /// Create a service with its own audit log
    pub fn new(initial: SecurityConfig, history: Arc<dyn RecipientHistory>) -> Self {
        Self::with_audit_log(initial, history, Arc::new(SecurityAuditLog::new()))
    }

    /// Create a service writing to a shared audit log
    pub fn with_audit_log(
        initial: SecurityConfig,
        history: Arc<dyn RecipientHistory>,
        audit: Arc<SecurityAuditLog>,
    ) -> Self {
        let config = Arc::new(SecurityConfigStore::new(initial, audit.clone()));
        let risk = RiskEngine::new(config.clone(), audit.clone(), history);
        Self {
            config,
            audit,
            risk,
        }
    }

    /// Current policy config
    pub async fn config(&self) -> SecurityConfig {
        self.config.get().await
    }

    /// Partially update the policy config
    pub async fn update_config(&self, patch: SecurityConfigPatch) -> SecurityConfig {
        self.config.update(patch).await
    }

    /// Ad hoc risk assessment, not tied to a stored proposal
    pub async fn assess(&self, tx: &TransactionRequest) -> RiskAssessment {
        self.risk.assess(tx).await
    }

    /// Most recent audit entries
    pub async fn logs(&self, limit: usize) -> Vec<SecurityLogEntry> {
        self.audit.tail(limit).await
    }

    /// Record an audit event raised outside the policy surface
    pub async fn record_event(
        &self,
        event_type: &str,
        severity: Severity,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> SecurityLogEntry {
        self.audit
            .append(event_type, severity, message, details)
            .await
    }

    /// Static audit of the policy config
    pub async fn run_scan(&self) -> ScanReport {
        let config = self.config.get().await;
        let results = scan_config(&config);
        let scan_id = Uuid::new_v4().to_string();

        self.audit
            .append(
                "security_scan",
                Severity::Info,
                "Security scan completed",
                Some(json!({ "scanId": scan_id, "results": results })),
            )
            .await;

        ScanReport {
            scan_id,
            timestamp: Utc::now(),
            results,
        }
    }

    /// Hardening advice for the current config
    pub async fn recommendations(&self) -> Vec<String> {
        recommendations_for(&self.config.get().await)
    }

    pub fn config_store(&self) -> &Arc<SecurityConfigStore> {
        &self.config
    }

    pub fn audit_log(&self) -> &Arc<SecurityAuditLog> {
        &self.audit
    }

    pub fn risk_engine(&self) -> &RiskEngine {
        &self.risk
    }
}

/// Vulnerabilities and warnings in a config
pub fn scan_config(config: &SecurityConfig) -> ScanResults {
    let mut results = ScanResults::default();

    if config.security_level == SecurityLevel::Low {
        results
            .warnings
            .push("Security level is set to low".to_string());
        results
            .recommendations
            .push("Increase security level to medium or high".to_string());
    }

    if !config.require_hardware_wallet {
        results
            .vulnerabilities
            .push("Hardware wallet requirement is disabled".to_string());
        results
            .recommendations
            .push("Enable hardware wallet requirement".to_string());
    }

    if !config.enable_risk_assessment {
        results
            .warnings
            .push("Risk assessment is disabled".to_string());
        results
            .recommendations
            .push("Enable risk assessment".to_string());
    }

    results
}

/// Hardening advice for a config
pub fn recommendations_for(config: &SecurityConfig) -> Vec<String> {
    let mut recommendations = Vec::new();

    if config.security_level == SecurityLevel::Low {
        recommendations.push("Increase security level to medium or high".to_string());
    }
    if !config.require_hardware_wallet {
        recommendations.push("Enable hardware wallet requirement for all transactions".to_string());
    }
    if !config.enable_risk_assessment {
        recommendations.push("Enable risk assessment for all transactions".to_string());
    }
    if !config.enable_anomaly_detection {
        recommendations
            .push("Enable anomaly detection to identify suspicious transactions".to_string());
    }
    if config.allowed_addresses.is_empty() {
        recommendations.push("Add trusted addresses to the allowed list".to_string());
    }

    recommendations
}
