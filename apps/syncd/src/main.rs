//! # Fresis Sync Daemon
//!
//! Wires the engine together and runs it until SIGINT:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  config ──▶ pool + migrations ──▶ scheduler.start()                     │
//! │                                        │                                │
//! │                                   ctrl-c ──▶ scheduler.stop()           │
//! │                                        │     (trips tokens, awaits      │
//! │                                        ▼      running pipelines)        │
//! │                                   pool.close()                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use fresis_db::{Database, DbConfig};
use fresis_sync::{Scheduler, SnapshotParsers, SpoolDirSource};

use crate::config::SyncdConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is a development convenience; absence is fine.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting Fresis sync daemon");

    let config = SyncdConfig::load()?;
    let database_url = config.database_url()?.to_string();
    let spool_dir = config.spool_dir()?.to_path_buf();

    info!(
        spool_dir = %spool_dir.display(),
        max_connections = config.max_connections,
        "Configuration loaded"
    );

    let db = Database::connect(
        DbConfig::new(database_url).max_connections(config.max_connections),
    )
    .await?;
    info!("Connected to PostgreSQL, migrations applied");

    let store = Arc::new(db.clone());
    let source = Arc::new(SpoolDirSource::new(spool_dir));
    let scheduler = Scheduler::new(store, source, SnapshotParsers::json());

    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.stop().await;
    db.close().await;

    info!("Fresis sync daemon stopped");
    Ok(())
}
