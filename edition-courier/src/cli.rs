///
/// This module implements the full CLI interface for edition-courier:
/// command parsing, argument validation, main entrypoints, and user-visible
/// invocations.
///
/// All core business logic (data models, pipelines, reconciliation) lives in
/// the [`edition-courier-core`] crate. This module is strictly for CLI glue,
/// ergonomic argument exposure, and orchestration.
///
/// ## Features
/// - Entry struct [`Cli`] defines all user-facing options and subcommands.
/// - Subcommand routing (`process`, `check`, `cookie`) and argument
///   validation.
/// - Async entrypoint (`run`) for programmatic invocation and integration
///   testing.
///
/// ## How To Use
/// - For command-line users: use the installed `edition-courier` binary with
///   `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed
///   [`Cli`].
///
/// ## Extending
/// When adding features or subcommands, update [`Commands`] below and keep
/// all non-trivial business logic inside `edition-courier-core`.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

use edition_courier_core::orchestrate::{Orchestrator, RunOptions};
use edition_courier_core::store::{JsonFileStore, Store};

use crate::drive::DriveClient;
use crate::fetch::KioskClient;
use crate::load_config::{load_config, CliConfig};
use crate::mail::MailRelayClient;

/// CLI for edition-courier: deliver new publication editions to mail and
/// cloud-archive channels.
#[derive(Parser)]
#[clap(
    name = "edition-courier",
    version,
    about = "Discover subscription publications and deliver new editions by mail and cloud archive"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: discovery, delivery, archive, cleanup
    Process {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Edition key to process even if already recorded (e.g.
        /// 2025-11-26_gazette); the ledger record is written afterwards
        #[clap(long)]
        force: Option<String>,
    },
    /// Discovery only: reconcile the remote listing, deliver nothing
    Check {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Refresh the stored auth cookie (the only config write path)
    Cookie {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// The new cookie value
        #[clap(long)]
        value: String,
        /// Who performed the refresh, for the audit trail
        #[clap(long, default_value = "cli")]
        updated_by: String,
    },
}

fn open_store(config: &CliConfig) -> Result<JsonFileStore> {
    let store = JsonFileStore::new(&config.data_dir);
    store.initialise()?;
    Ok(store)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Process { config, force } => {
            let config = load_config(config)?;
            tracing::info!(command = "process", "Starting courier run");

            let store = open_store(&config)?;
            let snapshot = store.load_app_config().await?;
            let fetcher = KioskClient::new(
                &config.kiosk.base_url,
                &snapshot.auth_cookie.value,
                Duration::from_secs(config.kiosk.timeout_seconds),
            )?;
            let mailer = MailRelayClient::from_config(&config.mail)?;
            let drive = DriveClient::from_config(&config.drive)?;

            let options = RunOptions {
                force_edition: force,
            };
            let orchestrator = Orchestrator::new(&store, &fetcher, &mailer, &drive, options);
            match orchestrator.run().await {
                Ok(summary) => {
                    tracing::info!(command = "process", ?summary, "Courier run complete");
                    println!("{summary:#?}");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "process", error = %e, "Courier run failed");
                    Err(e.into())
                }
            }
        }
        Commands::Check { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "check", "Starting discovery-only run");

            let store = open_store(&config)?;
            let snapshot = store.load_app_config().await?;
            let fetcher = KioskClient::new(
                &config.kiosk.base_url,
                &snapshot.auth_cookie.value,
                Duration::from_secs(config.kiosk.timeout_seconds),
            )?;
            let mailer = MailRelayClient::from_config(&config.mail)?;
            let drive = DriveClient::from_config(&config.drive)?;

            let orchestrator =
                Orchestrator::new(&store, &fetcher, &mailer, &drive, RunOptions::default());
            match orchestrator.check().await {
                Ok(report) => {
                    tracing::info!(command = "check", ?report, "Discovery complete");
                    println!("{report:#?}");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "check", error = %e, "Discovery failed");
                    Err(e.into())
                }
            }
        }
        Commands::Cookie {
            config,
            value,
            updated_by,
        } => {
            let config = load_config(config)?;
            let store = open_store(&config)?;
            store
                .update_auth_cookie(&value, &updated_by, Utc::now())
                .await?;
            tracing::info!(command = "cookie", updated_by = %updated_by, "Auth cookie refreshed");
            println!("Auth cookie refreshed.");
            Ok(())
        }
    }
}
