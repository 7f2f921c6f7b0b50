//! Ingestion daemon: loads config, opens the store, and runs the
//! scheduler until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use intake_core::config::{self, Config};
use intake_engine::{IngestionPipeline, Scheduler};
use intake_store::RunStore;

#[derive(Parser, Debug)]
#[command(name = "intaked", about = "Scheduled multi-source ingestion daemon")]
struct Cli {
    /// SQLite database file for runs and records.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Root directory for payload files and index state.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Scheduler tick interval in seconds.
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(secs) = cli.interval {
        config.scheduler_interval = Duration::from_secs(secs);
    }
    config.log_summary();

    let store = RunStore::open(&config.db_path).await?;
    let pipeline = Arc::new(IngestionPipeline::new(store, &config));
    let scheduler = Arc::new(Scheduler::new(pipeline, config));
    let handle = scheduler.clone().start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    scheduler.shutdown();
    handle.await?;
    Ok(())
}
