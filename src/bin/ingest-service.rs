//! # Ingest Service
//!
//! Command-line entry point: runs the webhook server with the expiry reaper,
//! a single reaper sweep, or the schema migrations.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ingest_core::config::ConfigManager;
use ingest_core::database::{DatabaseConnection, DatabaseMigrations};
use ingest_core::logging::init_structured_logging;
use ingest_core::web::{self, AppState};
use ingest_core::IngestService;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ingest-service")]
#[command(about = "Partner data file ingestion service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Directory holding ingest-config.yaml (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment section to apply (default: INGEST_ENV, then development)
    #[arg(short, long)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the bucket webhooks and run the expiry reaper
    Serve,
    /// Run one expiry sweep and exit
    Sweep,
    /// Apply outstanding database migrations
    Migrate,
    /// Load and validate the configuration, then exit
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.environment {
        Some(environment) => ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment),
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("failed to load configuration")?;
    let config = manager.config();
    init_structured_logging(&config.telemetry);

    match cli.command {
        Commands::Validate => {
            info!(environment = %manager.environment(), "✅ Configuration is valid");
        }
        Commands::Migrate => {
            let url = config
                .database_url()
                .context("database.url is not set and DATABASE_URL is not exported")?;
            let connection = DatabaseConnection::connect(&url, &config.database).await?;
            DatabaseMigrations::run_all(connection.pool()).await?;
            connection.close().await;
        }
        Commands::Sweep => {
            let service = IngestService::from_config(config).await?;
            let report = service.reaper().sweep().await?;
            service.wait_for_dispatches().await;
            info!(expired = report.expired.len(), "Sweep finished");
        }
        Commands::Serve => {
            let service = Arc::new(IngestService::from_config(config).await?);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let reaper = tokio::spawn(
                service
                    .reaper()
                    .run(config.reaper.interval(), shutdown_rx.clone()),
            );

            let state = AppState::new(service.clone());
            let bind_address = config.web.bind_address.clone();
            let mut server_shutdown = shutdown_rx;
            let mut server = tokio::spawn(async move {
                web::serve(state, &bind_address, async move {
                    let _ = server_shutdown.wait_for(|stop| *stop).await;
                })
                .await
            });

            let server_done = tokio::select! {
                result = &mut server => {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!(error = %e, "Webhook server stopped with an error"),
                        Err(e) => error!(error = %e, "Webhook server task failed"),
                    }
                    true
                }
                _ = signal::ctrl_c() => {
                    info!("🛑 Shutdown signal received");
                    false
                }
            };

            let _ = shutdown_tx.send(true);
            if !server_done {
                if let Ok(Err(e)) = server.await {
                    error!(error = %e, "Webhook server stopped with an error");
                }
            }
            if let Err(e) = reaper.await {
                error!(error = %e, "Expiry reaper task failed");
            }
            service.wait_for_dispatches().await;
            info!("Ingest service stopped");
        }
    }

    Ok(())
}
