//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::Confirm;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::App;
use crate::proposal::{ProposalDraft, ProposalStatus};
use crate::security::{SecurityConfigPatch, TransactionRequest};
use crate::wallet::{verify_simulated_signature, WalletType};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Pick a device: the one named, else the current one, else a fresh connection
async fn resolve_device(app: &App, device: Option<String>, wallet: WalletType) -> Result<String> {
    if let Some(device_id) = device {
        return Ok(device_id);
    }

    if let Some(current) = app.wallets.current().await {
        return Ok(current.device_id);
    }

    info!("No wallet connected, connecting {}", wallet);
    let session = app.wallets.connect(wallet).await?;
    Ok(session.device_id)
}

/// Show current configuration (secrets masked)
pub fn show_config(app: &App) -> Result<()> {
    println!("{}", app.config.masked_display());
    Ok(())
}

// ============================================================================
// Security
// ============================================================================

pub async fn security_config(app: &App) -> Result<()> {
    print_json(&app.security.config().await)
}

pub async fn security_update(app: &App, patch: SecurityConfigPatch) -> Result<()> {
    if patch.is_empty() {
        anyhow::bail!("Nothing to update - pass at least one setting");
    }

    let updated = app.security.update_config(patch).await;
    print_json(&updated)
}

pub async fn security_assess(app: &App, request: TransactionRequest) -> Result<()> {
    if request.recipient.trim().is_empty() {
        anyhow::bail!("recipient is required");
    }

    let assessment = app.security.assess(&request).await;
    print_json(&assessment)
}

pub async fn security_logs(app: &App, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or_else(|| app.default_log_limit());
    let entries = app.security.logs(limit).await;

    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{} [{}] {:<22} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.severity,
            entry.event_type,
            entry.message
        );
    }
    Ok(())
}

pub async fn security_scan(app: &App) -> Result<()> {
    let report = app.security.run_scan().await;

    println!("\n=== SECURITY SCAN {} ===\n", report.scan_id);
    if report.results.is_clean() {
        println!("No issues found.");
        return Ok(());
    }

    for v in &report.results.vulnerabilities {
        println!("VULNERABILITY: {}", v);
    }
    for w in &report.results.warnings {
        println!("WARNING: {}", w);
    }
    println!();
    for r in &report.results.recommendations {
        println!("  - {}", r);
    }
    Ok(())
}

pub async fn security_recommendations(app: &App) -> Result<()> {
    let recommendations = app.security.recommendations().await;
    if recommendations.is_empty() {
        println!("No recommendations - policy is fully hardened.");
    }
    for r in &recommendations {
        println!("  - {}", r);
    }
    Ok(())
}

// ============================================================================
// Proposals
// ============================================================================

pub async fn proposal_create(app: &App, draft: ProposalDraft) -> Result<()> {
    let (proposal, assessment) = app.create_proposal(draft).await?;

    print_json(&proposal)?;

    if let Some(assessment) = assessment {
        println!(
            "\nRisk: {} ({}){}",
            assessment.risk_score,
            assessment.risk_level,
            if assessment.is_approved {
                ""
            } else {
                " - NOT RECOMMENDED FOR APPROVAL"
            }
        );
        for r in &assessment.recommendations {
            println!("  - {}", r);
        }
    }
    Ok(())
}

pub async fn proposal_get(app: &App, id: &str) -> Result<()> {
    print_json(&app.proposals.get(id).await?)
}

pub async fn proposal_list(app: &App) -> Result<()> {
    let proposals = app.proposals.list_all().await?;

    println!("\n=== PROPOSALS ===\n");
    if proposals.is_empty() {
        println!("No proposals.");
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:>14} {:<44} {}",
        "ID", "STATUS", "AMOUNT", "RECIPIENT", "PROPOSER"
    );
    println!("{}", "-".repeat(120));
    for p in &proposals {
        println!(
            "{:<38} {:<10} {:>14} {:<44} {}",
            p.id, p.status, p.amount, p.recipient, p.proposer
        );
    }
    Ok(())
}

pub async fn proposal_approve(app: &App, id: &str) -> Result<()> {
    print_json(&app.proposals.approve(id).await?)
}

pub async fn proposal_reject(app: &App, id: &str) -> Result<()> {
    print_json(&app.proposals.reject(id).await?)
}

pub async fn proposal_execute(
    app: &App,
    id: &str,
    device: Option<String>,
    wallet: WalletType,
    force: bool,
) -> Result<()> {
    let proposal = app.proposals.get(id).await?;
    if proposal.status != ProposalStatus::Approved {
        anyhow::bail!(
            "Proposal {} is {}, only approved proposals can be executed",
            id,
            proposal.status
        );
    }

    // Confirmation prompt (unless --force)
    if !force {
        let assessment = app.security.assess(&proposal.as_request()).await;
        if !assessment.is_approved {
            warn!(
                "Risk score {} for proposal {} is above the approval threshold",
                assessment.risk_score, id
            );
        }

        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Sign and submit {} to {} (risk {})? This cannot be undone.",
                proposal.amount, proposal.recipient, assessment.risk_level
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Execution cancelled by user");
            return Ok(());
        }
    }

    let device_id = resolve_device(app, device, wallet).await?;
    println!("Confirm the transaction on device {}...", device_id);

    let receipt = app.coordinator.execute(id, &device_id).await?;
    println!("\nTransaction submitted!");
    print_json(&receipt)?;

    if app.simulated_device.is_some() {
        println!(
            "\nCheck with: airgap wallet verify {} {} {} --hex --path \"{}\"",
            receipt.signature, receipt.public_key, receipt.signed_payload, receipt.derivation_path
        );
    }
    Ok(())
}

pub async fn proposal_status(app: &App, id: &str) -> Result<()> {
    print_json(&app.coordinator.proposal_status(id).await?)
}

pub async fn proposal_record(app: &App, id: &str) -> Result<()> {
    print_json(&app.coordinator.record_submitted(id).await?)
}

// ============================================================================
// Wallets
// ============================================================================

pub async fn wallet_connect(app: &App, wallet: WalletType) -> Result<()> {
    let session = app.wallets.connect(wallet).await?;
    print_json(&session)
}

pub async fn wallet_disconnect(app: &App, device_id: &str) -> Result<()> {
    app.wallets.disconnect(device_id).await?;
    println!("Disconnected {}", device_id);
    Ok(())
}

pub async fn wallet_status(app: &App) -> Result<()> {
    println!("\n=== WALLET STATUS ===\n");
    println!(
        "Supported: {}",
        app.wallets
            .supported()
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if app.simulated_device.is_some() {
        println!("Signer mode: SIMULATED (placeholder signatures)");
    }

    let sessions = app.wallets.list().await;
    if sessions.is_empty() {
        println!("\nNo wallets connected.");
        return Ok(());
    }

    let current = app.wallets.current().await.map(|s| s.device_id);
    let probes = app.wallets.test_all().await;
    println!();
    for session in &sessions {
        let alive = probes
            .iter()
            .find(|(id, _)| *id == session.device_id)
            .map(|(_, alive)| *alive)
            .unwrap_or(false);
        println!(
            "{}{} ({})",
            if current.as_deref() == Some(session.device_id.as_str()) {
                "* "
            } else {
                "  "
            },
            session.device_id,
            session.wallet_type
        );
        println!("    Address: {}", session.address);
        println!("    Reachable: {}", if alive { "yes" } else { "NO" });
    }
    Ok(())
}

pub async fn wallet_address(app: &App, device: Option<String>, wallet: WalletType) -> Result<()> {
    let device_id = resolve_device(app, device, wallet).await?;
    let signer = app.wallets.signer(&device_id).await?;
    println!("{}", signer.address().await?);
    Ok(())
}

pub async fn wallet_balance(app: &App, device: Option<String>, wallet: WalletType) -> Result<()> {
    let device_id = resolve_device(app, device, wallet).await?;
    let session = app.wallets.session(&device_id).await?;
    let balance: Decimal = app.wallet_balance(&device_id).await?;
    println!("{} {}", session.address, balance);
    Ok(())
}

pub async fn wallet_test(app: &App, device: Option<String>, wallet: WalletType) -> Result<()> {
    let device_id = resolve_device(app, device, wallet).await?;
    if app.wallets.test_connection(&device_id).await {
        println!("{}... OK", device_id);
        Ok(())
    } else {
        anyhow::bail!("Device {} is not responding", device_id)
    }
}

/// Check a signature produced in simulated mode
pub fn wallet_verify(
    signature: &str,
    public_key: &str,
    message: &str,
    message_is_hex: bool,
    path: &str,
) -> Result<()> {
    let message = if message_is_hex {
        hex::decode(message.strip_prefix("0x").unwrap_or(message))
            .context("Invalid message hex")?
    } else {
        message.as_bytes().to_vec()
    };

    if verify_simulated_signature(signature, public_key, path, &message) {
        println!("Signature valid");
        Ok(())
    } else {
        anyhow::bail!("Signature does not match public key and message")
    }
}
