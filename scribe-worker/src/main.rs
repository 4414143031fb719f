//! Scribe Worker
//!
//! Long-running worker process for the scribe report engine.
//!
//! Architecture:
//! - Configuration: environment variables, validated before startup
//! - Engine: one instance owning the queue, ledger, cache, and executor
//! - Workers: pool consuming the shared queue until shutdown
//!
//! The process starts the configured number of workers, then waits for
//! ctrl-c; on shutdown the queue stops delivering and workers drain.

use anyhow::{Context, Result};
use scribe_engine::{Engine, EngineConfig};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribe_engine=info,scribe_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Scribe Worker");

    // Load and validate configuration; a missing credential fails here,
    // never inside a pipeline stage.
    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: pipelines_dir={}, db_path={}, workers={}, provider={}",
        config.pipelines_dir.display(),
        config.db_path.display(),
        config.workers,
        config.llm.provider
    );

    // Build the engine: one queue, one ledger, one cache, one executor.
    let engine = Engine::new(config).await.context("Failed to build engine")?;

    let pipelines = engine
        .list_pipelines()
        .await
        .context("Failed to scan pipelines directory")?;
    info!("Found {} pipeline(s)", pipelines.len());
    for name in &pipelines {
        info!("  - {}", name);
    }

    // Start the worker pool.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = engine.start_workers(shutdown_rx);
    info!("Started {} worker(s), waiting for jobs", handles.len());

    // Run until ctrl-c.
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, draining workers");

    if shutdown_tx.send(true).is_err() {
        error!("All workers already stopped");
    }
    engine.close_queue();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker task panicked: {}", e);
        }
    }

    info!("Scribe Worker stopped");
    Ok(())
}
