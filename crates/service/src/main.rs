//! Scoreq Service - Main Entry Point
//! One dispatch manager and N scoring workers over the configured queue store.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use scoreq_core::application::{shutdown_channel, QueueClient};
use scoreq_core::port::time_provider::SystemTimeProvider;
use scoreq_infra_system::JsonModelLoader;
use scoreq_service::logging::init_logging;
use scoreq_service::{open_store, run_group, ServiceSettings, SettingsArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "scoreq-service")]
#[command(about = "Scoring dispatch service: pulls requests, scores them on N workers, publishes results", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    let _log_guard = init_logging("scoreq=info")?;
    info!("Scoreq service v{} starting...", VERSION);

    // 2. Load configuration
    let settings = ServiceSettings::load(&cli.settings).context("Failed to load settings")?;
    info!(
        workers = settings.workers,
        max_batch = settings.max_batch,
        backend = %settings.storage_backend,
        storage_path = %settings.storage_path,
        model_path = %settings.model_path,
        "Settings loaded"
    );

    // 3. Open the queue store
    let store = open_store(&settings, Arc::new(SystemTimeProvider))
        .await
        .context("Failed to open queue store")?;
    let client = QueueClient::new(store);

    // 4. Shutdown on Ctrl+C
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received. Stopping workers...");
                shutdown_tx.shutdown();
            }
            Err(e) => error!(error = ?e, "Failed to listen for Ctrl+C"),
        }
    });

    // 5. Run the process group until shutdown or a fatal error
    info!("Press Ctrl+C to shutdown");
    let report = run_group(&settings, client, &JsonModelLoader::new(), shutdown_rx)
        .await
        .context("Process group failed")?;

    info!(
        workers = report.workers.len(),
        scored = report.scored(),
        failed = report.failed(),
        "Shutdown complete."
    );
    Ok(())
}
