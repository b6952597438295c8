///
/// This module implements the CLI interface for merge-watch: command parsing,
/// the async entrypoint and user-visible output.
///
/// All matching, conversion, tracking and finalization logic lives in the
/// library modules; this module only loads configuration and wires it up.
///
/// ## Commands
/// - `watch`: validate configuration, then watch the folder until Ctrl+C.
/// - `check`: validate configuration and print the loaded clients.
/// - `finalize`: merge and send one client's artifact from canonical files
///   already in the watch folder, without reprocessing any sources.
/// - `test-mail`: send a test message through the configured mail settings.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;
use crate::contract::Notifier;
use crate::error::ConfigError;
use crate::finalize::FinalizeOutcome;
use crate::load_config::{load_config, WatchConfig, DEFAULT_CLIENTS_FILE};
use crate::service;
use crate::tracker::ClientProgress;

/// CLI for merge-watch: convert, merge and deliver client document sets.
#[derive(Parser)]
#[clap(
    name = "merge-watch",
    version,
    about = "Watch a folder for client documents, convert them to PDF, merge each completed set and mail it"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the folder from WATCH_FOLDER and process arriving files
    Watch {
        /// Path to the client configuration (JSON or YAML)
        #[clap(long, default_value = DEFAULT_CLIENTS_FILE)]
        clients: PathBuf,
    },
    /// Validate the configuration and list the configured clients
    Check {
        /// Path to the client configuration (JSON or YAML)
        #[clap(long, default_value = DEFAULT_CLIENTS_FILE)]
        clients: PathBuf,
    },
    /// Merge and send one client's artifact from the PDFs already present
    Finalize {
        /// Path to the client configuration (JSON or YAML)
        #[clap(long, default_value = DEFAULT_CLIENTS_FILE)]
        clients: PathBuf,
        /// Client id to finalize
        #[clap(long)]
        client: String,
    },
    /// Send a test mail to EMAIL_TO through SMTP, or write it as a draft
    TestMail,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Watch { clients } => {
            let config = load_config(&clients).context("configuration is invalid; not watching")?;
            tracing::info!(command = "watch", "Starting watch");
            println!(
                "Watching {} for {} client(s). Press Ctrl+C to stop.",
                config.settings.watch_folder.display(),
                config.registry.clients().len()
            );
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            };
            let summary = service::watch(&config, shutdown).await?;
            println!("Stopped. {summary:?}");
            Ok(())
        }
        Commands::Check { clients } => {
            let config = load_config(&clients)?;
            print_clients(&config);
            Ok(())
        }
        Commands::Finalize { clients, client } => {
            let config = load_config(&clients)?;
            let spec = config
                .registry
                .get(&client)
                .ok_or_else(|| ConfigError::UnknownClient(client.clone()))?;
            let progress = ClientProgress::from_directory(spec, &config.settings.watch_folder);
            let finalizer = service::build_finalizer(&config)?;
            tracing::info!(command = "finalize", client_id = %spec.id, "Finalizing on request");
            match finalizer.finalize(spec, &progress).await {
                FinalizeOutcome::Delivered { artifact } => {
                    println!("Delivered {}", artifact.display());
                    Ok(())
                }
                FinalizeOutcome::Incomplete { missing } => {
                    anyhow::bail!("client {client} is missing {}", missing.join(", "))
                }
                FinalizeOutcome::MergeFailed { reason } => {
                    anyhow::bail!("merge failed for client {client}: {reason}")
                }
                FinalizeOutcome::NotificationFailed { artifact, reason } => anyhow::bail!(
                    "{} was written but the notification failed: {reason}",
                    artifact.display()
                ),
            }
        }
        Commands::TestMail => {
            let settings = Settings::from_env()?;
            settings.trace_loaded();
            let notifier = service::build_notifier(&settings)?;
            let notification = service::test_notification(&settings);
            tracing::info!(command = "test-mail", recipient = %settings.recipient, "Sending test mail");
            notifier
                .notify(&notification)
                .await
                .map_err(|e| anyhow::anyhow!("test mail to {} failed: {e}", settings.recipient))?;
            match &settings.smtp {
                Some(smtp) => println!("Test mail sent to {} via {}", settings.recipient, smtp.server),
                None => println!(
                    "Test mail for {} written to {}",
                    settings.recipient,
                    settings.draft_dir.display()
                ),
            }
            Ok(())
        }
    }
}

fn print_clients(config: &WatchConfig) {
    println!("Watch folder: {}", config.settings.watch_folder.display());
    println!("Loaded clients: {}", config.registry.clients().len());
    for client in config.registry.clients() {
        println!("  Client {}: {} ({})", client.id, client.display_name, client.year);
        for file in &client.expected_files {
            println!("    {} -> {} [{}]", file.pattern, file.canonical_name(), file.kind);
        }
        println!("    merge order: {}", client.merge_order.join(", "));
        println!("    artifact:    {}", client.artifact_name());
    }
}
