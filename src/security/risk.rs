//! Transaction risk scoring
//!
//! Scoring rules (max 100):
//! - Amount above configured maximum: +40
//! - Recipient outside a non-empty allow-list: +30
//! - Anomaly detection (if enabled): +10 for amounts above 1000,
//!   +20 for a previously unseen recipient
//!
//! A transaction is approved iff its score is below 70.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;

use super::audit::SecurityAuditLog;
use super::config_store::SecurityConfigStore;
use super::history::RecipientHistory;
use super::types::{RiskAssessment, RiskLevel, SecurityConfig, Severity, TransactionRequest};

/// Score added when the amount exceeds the configured maximum
pub const OVER_MAX_AMOUNT_SCORE: u8 = 40;

/// Score added when the recipient is outside the allow-list
pub const NOT_ALLOWED_RECIPIENT_SCORE: u8 = 30;

/// Anomaly score for a large amount
pub const LARGE_AMOUNT_ANOMALY_SCORE: u8 = 10;

/// Anomaly score for an unseen recipient
pub const UNSEEN_RECIPIENT_ANOMALY_SCORE: u8 = 20;

/// Scores at or above this are rejected
pub const APPROVAL_THRESHOLD: u8 = 70;

fn large_amount_threshold() -> Decimal {
    Decimal::from(1_000)
}

/// Score a transaction against `config` without side effects
pub fn score_transaction(
    tx: &TransactionRequest,
    config: &SecurityConfig,
    history: &dyn RecipientHistory,
) -> RiskAssessment {
    let mut score: u8 = 0;
    let mut recommendations = Vec::new();

    if tx.amount > config.max_transaction_amount {
        score += OVER_MAX_AMOUNT_SCORE;
        recommendations.push(format!(
            "Transaction amount exceeds maximum allowed amount of {}",
            config.max_transaction_amount
        ));
    }

    if !config.allowed_addresses.is_empty() && !config.allowed_addresses.contains(&tx.recipient) {
        score += NOT_ALLOWED_RECIPIENT_SCORE;
        recommendations.push("Recipient address is not in allowed list".to_string());
    }

    if config.enable_anomaly_detection {
        score += anomaly_score(tx, history);
    }

    RiskAssessment {
        risk_score: score,
        risk_level: RiskLevel::from_score(score),
        recommendations,
        is_approved: score < APPROVAL_THRESHOLD,
    }
}

fn anomaly_score(tx: &TransactionRequest, history: &dyn RecipientHistory) -> u8 {
    let mut anomaly = 0;

    if tx.amount > large_amount_threshold() {
        anomaly += LARGE_AMOUNT_ANOMALY_SCORE;
    }

    if history.is_unseen(&tx.recipient) {
        anomaly += UNSEEN_RECIPIENT_ANOMALY_SCORE;
    }

    anomaly
}

/// Risk engine bound to the live config, audit log and recipient history
pub struct RiskEngine {
    config: Arc<SecurityConfigStore>,
    audit: Arc<SecurityAuditLog>,
    history: Arc<dyn RecipientHistory>,
}

impl RiskEngine {
    pub fn new(
        config: Arc<SecurityConfigStore>,
        audit: Arc<SecurityAuditLog>,
        history: Arc<dyn RecipientHistory>,
    ) -> Self {
        Self {
            config,
            audit,
            history,
        }
    }

    /// Assess against the current config and record the outcome
    pub async fn assess(&self, tx: &TransactionRequest) -> RiskAssessment {
        let config = self.config.get().await;
        self.assess_with(tx, &config).await
    }

    /// Assess against an explicit config and record the outcome
    pub async fn assess_with(
        &self,
        tx: &TransactionRequest,
        config: &SecurityConfig,
    ) -> RiskAssessment {
        let assessment = score_transaction(tx, config, self.history.as_ref());

        self.audit
            .append(
                "risk_assessment",
                Severity::Info,
                "Transaction risk assessment completed",
                Some(json!({
                    "transaction": tx,
                    "riskScore": assessment.risk_score,
                    "riskLevel": assessment.risk_level,
                    "isApproved": assessment.is_approved,
                })),
            )
            .await;

        assessment
    }

    /// Recipient history consulted for the unseen-recipient signal
    pub fn history(&self) -> &Arc<dyn RecipientHistory> {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::history::{AlwaysUnseen, ObservedRecipients};

    fn config(max: i64, allowed: &[&str], anomaly: bool) -> SecurityConfig {
        SecurityConfig {
            max_transaction_amount: Decimal::from(max),
            allowed_addresses: allowed.iter().map(|a| a.to_string()).collect(),
            enable_anomaly_detection: anomaly,
            ..Default::default()
        }
    }

    fn tx(amount: i64, recipient: &str) -> TransactionRequest {
        TransactionRequest {
            amount: Decimal::from(amount),
            recipient: recipient.to_string(),
            proposer: "alice".to_string(),
        }
    }

    #[test]
    fn test_over_max_only() {
        let result = score_transaction(&tx(15_000, "0xabc"), &config(10_000, &[], false), &AlwaysUnseen);

        assert_eq!(result.risk_score, 40);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert!(result.is_approved);
        assert_eq!(
            result.recommendations,
            vec!["Transaction amount exceeds maximum allowed amount of 10000".to_string()]
        );
    }

    #[test]
    fn test_over_max_and_not_allowed() {
        let result = score_transaction(
            &tx(15_000, "0xabc"),
            &config(10_000, &["0xdef"], false),
            &AlwaysUnseen,
        );

        assert_eq!(result.risk_score, 70);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(!result.is_approved);
        assert_eq!(result.recommendations.len(), 2);
    }

    #[test]
    fn test_allowed_recipient_adds_nothing() {
        let result = score_transaction(&tx(5, "0xdef"), &config(10_000, &["0xdef"], false), &AlwaysUnseen);
        assert_eq!(result.risk_score, 0);
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_anomaly_sub_score() {
        let result = score_transaction(&tx(5_000, "0xabc"), &config(10_000, &[], true), &AlwaysUnseen);
        assert_eq!(result.risk_score, 30);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        // Anomalies add no recommendation text
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_anomaly_with_known_recipient() {
        let history = ObservedRecipients::new();
        history.record("0xabc");

        let result = score_transaction(&tx(500, "0xabc"), &config(10_000, &[], true), &history);
        assert_eq!(result.risk_score, 0);
    }

    #[test]
    fn test_maximum_score() {
        let result = score_transaction(&tx(50_000, "0xabc"), &config(10_000, &["0xdef"], true), &AlwaysUnseen);
        assert_eq!(result.risk_score, 100);
        assert!(!result.is_approved);
    }

    #[test]
    fn test_amount_equal_to_max_is_not_over() {
        let result = score_transaction(&tx(10_000, "0xabc"), &config(10_000, &[], false), &AlwaysUnseen);
        assert_eq!(result.risk_score, 0);
    }

    #[tokio::test]
    async fn test_engine_logs_assessment() {
        let audit = Arc::new(SecurityAuditLog::new());
        let store = Arc::new(SecurityConfigStore::new(config(10_000, &[], false), audit.clone()));
        let engine = RiskEngine::new(store, audit.clone(), Arc::new(AlwaysUnseen));

        let result = engine.assess(&tx(15_000, "0xabc")).await;
        assert_eq!(result.risk_score, 40);

        let entries = audit.tail(1).await;
        assert_eq!(entries[0].event_type, "risk_assessment");
        let details = entries[0].details.as_ref().unwrap();
        assert_eq!(details["riskScore"], 40);
        assert_eq!(details["riskLevel"], "medium");
        assert_eq!(details["isApproved"], true);
        assert_eq!(details["transaction"]["recipient"], "0xabc");
    }
}
