//! airgap - propose, review and execute transfers signed on a hardware wallet
//!
//! # WARNING
//! - In `simulated` signer mode signatures are placeholders, not real keys.
//! - Executed transfers cannot be undone.

use std::collections::BTreeSet;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

// Use the library crate
use airgap_vault::app::App;
use airgap_vault::cli::commands;
use airgap_vault::config::Config;
use airgap_vault::proposal::ProposalDraft;
use airgap_vault::security::{SecurityConfigPatch, SecurityLevel, TransactionRequest};
use airgap_vault::wallet::{WalletType, DEFAULT_DERIVATION_PATH};

/// airgap - hardware-wallet transfer vault
#[derive(Parser)]
#[command(name = "airgap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "airgap.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// One line typed into the interactive shell
#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration (secrets masked)
    Config,

    /// Risk policy commands
    Security {
        #[command(subcommand)]
        action: SecurityAction,
    },

    /// Transfer proposal commands
    Proposal {
        #[command(subcommand)]
        action: ProposalAction,
    },

    /// Hardware wallet commands
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Interactive session keeping wallet connections open between commands
    Shell,
}

#[derive(Subcommand)]
enum SecurityAction {
    /// Show the security policy
    Config,

    /// Update part of the security policy for this process
    ///
    /// The change is kept in memory only. Run it inside `airgap shell` to
    /// affect later commands, or set it under [security] in the config file
    /// to make it permanent.
    Update {
        /// low, medium or high
        #[arg(long)]
        level: Option<SecurityLevel>,

        /// Maximum transaction amount
        #[arg(long)]
        max_amount: Option<Decimal>,

        /// Replace the allow-list (repeatable)
        #[arg(long = "allow", value_name = "ADDRESS")]
        allowed_addresses: Vec<String>,

        /// Clear the allow-list
        #[arg(long, conflicts_with = "allowed_addresses")]
        clear_allowlist: bool,

        #[arg(long)]
        require_hardware_wallet: Option<bool>,

        #[arg(long)]
        risk_assessment: Option<bool>,

        #[arg(long)]
        anomaly_detection: Option<bool>,
    },

    /// Ad hoc risk assessment of a transfer
    Assess {
        amount: Decimal,
        recipient: String,

        #[arg(long, env = "AIRGAP_PRINCIPAL", default_value = "cli")]
        proposer: String,
    },

    /// Show recent audit log entries
    Logs {
        /// Number of entries (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Scan the policy for weaknesses
    Scan,

    /// Hardening recommendations
    Recommendations,
}

#[derive(Subcommand)]
enum ProposalAction {
    /// Propose a transfer
    Create {
        amount: Decimal,
        recipient: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Proposing principal
        #[arg(long, env = "AIRGAP_PRINCIPAL")]
        proposer: String,
    },

    /// Show one proposal
    Get { id: String },

    /// List all proposals
    List,

    /// Approve a pending proposal
    Approve { id: String },

    /// Reject a pending proposal
    Reject { id: String },

    /// Sign an approved proposal on a hardware wallet and submit it
    Execute {
        id: String,

        /// Connected device id (default: current device, else connect)
        #[arg(long)]
        device: Option<String>,

        /// Vendor to connect if no device is connected
        #[arg(long, default_value = "ledger")]
        wallet: WalletType,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Ledger status of an executed proposal
    Status { id: String },

    /// Store the executed state of a proposal the ledger already accepted
    Record { id: String },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Connect a device and make it current
    Connect {
        #[arg(default_value = "ledger")]
        wallet: WalletType,
    },

    /// Disconnect a device
    Disconnect { device_id: String },

    /// Show connected devices
    Status,

    /// Show the account address of a device
    Address {
        #[arg(long)]
        device: Option<String>,
        #[arg(long, default_value = "ledger")]
        wallet: WalletType,
    },

    /// Show the ledger balance of a device's account
    Balance {
        #[arg(long)]
        device: Option<String>,
        #[arg(long, default_value = "ledger")]
        wallet: WalletType,
    },

    /// Check that a device still responds
    Test {
        #[arg(long)]
        device: Option<String>,
        #[arg(long, default_value = "ledger")]
        wallet: WalletType,
    },

    /// Verify a signature produced in simulated mode
    Verify {
        signature: String,
        public_key: String,
        message: String,

        /// Message is hex, not text
        #[arg(long)]
        hex: bool,

        #[arg(long, default_value = DEFAULT_DERIVATION_PATH)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("airgap_vault=info,airgap=info"));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app = match App::from_config(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Shell => shell(&app).await,
        command => {
            if is_process_local(&command) {
                warn!("Policy updates outside `airgap shell` last only for this command");
            }
            run(&app, command).await
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// True for commands whose effect is lost when the process exits
fn is_process_local(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Security {
            action: SecurityAction::Update { .. }
        }
    )
}

/// Dispatch one command
async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Config => commands::show_config(app),
        Commands::Security { action } => match action {
            SecurityAction::Config => commands::security_config(app).await,
            SecurityAction::Update {
                level,
                max_amount,
                allowed_addresses,
                clear_allowlist,
                require_hardware_wallet,
                risk_assessment,
                anomaly_detection,
            } => {
                let allowed_addresses = if clear_allowlist {
                    Some(BTreeSet::new())
                } else if allowed_addresses.is_empty() {
                    None
                } else {
                    Some(allowed_addresses.into_iter().collect())
                };

                let patch = SecurityConfigPatch {
                    security_level: level,
                    max_transaction_amount: max_amount,
                    allowed_addresses,
                    require_hardware_wallet,
                    enable_risk_assessment: risk_assessment,
                    enable_anomaly_detection: anomaly_detection,
                };
                commands::security_update(app, patch).await
            }
            SecurityAction::Assess {
                amount,
                recipient,
                proposer,
            } => {
                commands::security_assess(
                    app,
                    TransactionRequest {
                        amount,
                        recipient,
                        proposer,
                    },
                )
                .await
            }
            SecurityAction::Logs { limit } => commands::security_logs(app, limit).await,
            SecurityAction::Scan => commands::security_scan(app).await,
            SecurityAction::Recommendations => commands::security_recommendations(app).await,
        },
        Commands::Proposal { action } => match action {
            ProposalAction::Create {
                amount,
                recipient,
                description,
                proposer,
            } => {
                let mut draft = ProposalDraft::new(amount, recipient, proposer);
                if let Some(description) = description {
                    draft = draft.with_description(description);
                }
                commands::proposal_create(app, draft).await
            }
            ProposalAction::Get { id } => commands::proposal_get(app, &id).await,
            ProposalAction::List => commands::proposal_list(app).await,
            ProposalAction::Approve { id } => commands::proposal_approve(app, &id).await,
            ProposalAction::Reject { id } => commands::proposal_reject(app, &id).await,
            ProposalAction::Execute {
                id,
                device,
                wallet,
                force,
            } => commands::proposal_execute(app, &id, device, wallet, force).await,
            ProposalAction::Status { id } => commands::proposal_status(app, &id).await,
            ProposalAction::Record { id } => commands::proposal_record(app, &id).await,
        },
        Commands::Wallet { action } => match action {
            WalletAction::Connect { wallet } => commands::wallet_connect(app, wallet).await,
            WalletAction::Disconnect { device_id } => {
                commands::wallet_disconnect(app, &device_id).await
            }
            WalletAction::Status => commands::wallet_status(app).await,
            WalletAction::Address { device, wallet } => {
                commands::wallet_address(app, device, wallet).await
            }
            WalletAction::Balance { device, wallet } => {
                commands::wallet_balance(app, device, wallet).await
            }
            WalletAction::Test { device, wallet } => {
                commands::wallet_test(app, device, wallet).await
            }
            WalletAction::Verify {
                signature,
                public_key,
                message,
                hex,
                path,
            } => commands::wallet_verify(&signature, &public_key, &message, hex, &path),
        },
        Commands::Shell => anyhow::bail!("Already in the shell"),
    }
}

/// Read commands from stdin until EOF or `exit`
async fn shell(app: &App) -> Result<()> {
    info!("Interactive shell - type 'help' for commands, 'exit' to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => {
                if let Err(e) = run(app, parsed.command).await {
                    error!("Command failed: {}", e);
                }
            }
            Err(e) => {
                // clap renders help and usage errors itself
                let _ = e.print();
            }
        }
    }

    for session in app.wallets.list().await {
        if let Err(e) = app.wallets.disconnect(&session.device_id).await {
            error!("Failed to disconnect {}: {}", session.device_id, e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_update_help_states_scope() {
        let mut cli = Cli::command();
        let help = cli
            .find_subcommand_mut("security")
            .and_then(|security| security.find_subcommand_mut("update"))
            .map(|update| update.render_long_help().to_string())
            .unwrap();
        assert!(help.contains("kept in memory only"));
    }

    #[test]
    fn test_policy_update_is_process_local() {
        let update = Cli::try_parse_from(["airgap", "security", "update", "--max-amount", "5"])
            .unwrap();
        assert!(is_process_local(&update.command));

        let list = Cli::try_parse_from(["airgap", "proposal", "list"]).unwrap();
        assert!(!is_process_local(&list.command));

        let record = Cli::try_parse_from(["airgap", "proposal", "record", "p1"]).unwrap();
        assert!(!is_process_local(&record.command));
    }
}
