//! Coda chain mirror daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use coda_indexer::{
    init_logging, IndexerConfig, IndexerMetrics, Reconciler, Scheduler, ShutdownController,
};
use coda_rpc::GraphQlClient;
use coda_store_sqlite::SqliteStore;
use coda_types::StateHash;

#[derive(Parser)]
#[command(name = "coda-mirror", about = "Mirror a Coda node's canonical chain into SQLite")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "CODA_MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// GraphQL endpoint of the node.
    #[arg(long, env = "CODA_NODE_URL")]
    node_url: Option<String>,

    /// SQLite database file.
    #[arg(long, env = "CODA_MIRROR_DB")]
    database: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, env = "CODA_MIRROR_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level or filter directive, e.g. "info" or "debug,coda_rpc=trace".
    #[arg(long, env = "CODA_MIRROR_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the scheduler until SIGINT or SIGTERM.
    Run,
    /// Run a single reconciliation pass and exit.
    Reconcile {
        /// How many of the most recent blocks to compare.
        #[arg(long)]
        lookback: Option<usize>,
    },
    /// Export one block by state hash. Its canonical status is settled by
    /// the next pass.
    Export { state_hash: String },
    /// Physically remove one block, reverting its counters if canonical.
    Rollback { state_hash: String },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<IndexerConfig> {
        let mut config = match &self.config {
            Some(path) => IndexerConfig::from_toml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => IndexerConfig::default(),
        };
        if let Some(url) = &self.node_url {
            config.node_url = url.clone();
        }
        if let Some(path) = &self.database {
            config.database_path = path.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_logging(config.log_format()?, &config.log_level)?;

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("opening {}", config.database_path.display()))?,
    );
    let client = Arc::new(GraphQlClient::new(&config.client_config())?);
    let metrics = Arc::new(IndexerMetrics::new()?);
    let reconciler = Arc::new(Reconciler::new(client, store, metrics));

    match cli.command {
        Command::Run => {
            tracing::info!(
                node_url = %config.node_url,
                database = %config.database_path.display(),
                lookback = config.lookback,
                "starting chain mirror"
            );
            let shutdown = ShutdownController::new();
            let mut scheduler = Scheduler::new(Arc::clone(&reconciler), config)?;
            scheduler.start(&shutdown).await;

            shutdown.wait_for_signal().await;
            scheduler.stop().await;

            tracing::debug!(metrics = %reconciler.metrics().encode()?, "final metrics");
            tracing::info!("chain mirror exited cleanly");
        }
        Command::Reconcile { lookback } => {
            let lookback = lookback.unwrap_or(config.lookback);
            let report = reconciler.reconcile(lookback).await?;
            println!(
                "imported={} promoted={} orphaned={} tip_height={}",
                report.imported,
                report.promoted,
                report.orphaned,
                report
                    .tip_height
                    .map_or_else(|| "none".to_string(), |h| h.to_string()),
            );
        }
        Command::Export { state_hash } => {
            let outcome = reconciler.export_block(&StateHash::new(state_hash)).await?;
            println!("{outcome:?}");
        }
        Command::Rollback { state_hash } => {
            let hash = StateHash::new(state_hash);
            if reconciler.rollback(&hash).await? {
                println!("rolled back {hash}");
            } else {
                println!("{hash} not found");
            }
        }
    }

    Ok(())
}
