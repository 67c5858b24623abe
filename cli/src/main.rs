//! chainscan CLI: run the fork-aware sync and inspect store state.
//!
//! Usage:
//! ```bash
//! chainscan run    --config chainscan.toml --to-block 18000000
//! chainscan status --config chainscan.toml
//! chainscan info
//! ```

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use chainscan_core::apply::ApplyEngine;
use chainscan_core::kv::KvStore;
use chainscan_evm::{HttpNode, NodeClient, SyncBuilder};
use chainscan_storage::{ChainReader, SqliteKv};

use config::AppConfig;

#[derive(Parser)]
#[command(
    name = "chainscan",
    about = "Fork-aware EVM block explorer indexer",
    long_about = "chainscan follows an EVM node, writes finalized blocks to the Full store \
and keeps the trailing fork window in a separate Fork store that can be rewound.\n\n\
ENVIRONMENT VARIABLES:\n  \
CHAINSCAN_RPC_URL   JSON-RPC endpoint (overrides rpc_url)\n  \
CHAINSCAN_DATA_DIR  directory holding full.db and fork.db (overrides data_dir)\n  \
RUST_LOG            tracing filter (overrides [log])",
    version
)]
struct Cli {
    /// Path to chainscan.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync from the node until --to-block or Ctrl-C
    Run {
        #[arg(long)]
        rpc_url: Option<String>,
        #[arg(long)]
        from_block: Option<u64>,
        #[arg(long)]
        to_block: Option<u64>,
        #[arg(long)]
        fork_depth: Option<u64>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print sync progress and the home summary as JSON
    Status,
    /// Print the effective configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            rpc_url,
            from_block,
            to_block,
            fork_depth,
            workers,
        } => {
            if let Some(url) = rpc_url {
                cfg.rpc_url = url;
            }
            if let Some(n) = from_block {
                cfg.sync.from_block = n;
            }
            if to_block.is_some() {
                cfg.sync.to_block = to_block;
            }
            if let Some(n) = fork_depth {
                cfg.sync.fork_depth = n;
            }
            if let Some(n) = workers {
                cfg.sync.workers = n;
            }
            logging::init_tracing(&cfg.log);
            cmd_run(cfg).await
        }
        Commands::Status => cmd_status(&cfg).await,
        Commands::Info => cmd_info(&cfg),
    }
}

async fn open_stores(cfg: &AppConfig) -> Result<(Arc<dyn KvStore>, Arc<dyn KvStore>)> {
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("creating data dir {}", cfg.data_dir.display()))?;
    let full = SqliteKv::open(&cfg.full_db().to_string_lossy())
        .await
        .context("opening full store")?;
    let fork = SqliteKv::open(&cfg.fork_db().to_string_lossy())
        .await
        .context("opening fork store")?;
    Ok((Arc::new(full), Arc::new(fork)))
}

async fn cmd_run(cfg: AppConfig) -> Result<()> {
    let (full, fork) = open_stores(&cfg).await?;
    let node: Arc<dyn NodeClient> = Arc::new(HttpNode::new(cfg.rpc_url.clone())?);
    info!(
        rpc = %cfg.rpc_url,
        data_dir = %cfg.data_dir.display(),
        chain = %cfg.sync.chain,
        "Starting chainscan"
    );

    let mut orchestrator = SyncBuilder::from_config(cfg.sync.clone())
        .build(node, full, fork)
        .await?;

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after in-flight blocks");
            let _ = stop.send(true);
        }
    });

    let report = orchestrator.run(shutdown).await?;
    info!(
        full_synced = report.full_synced,
        fork_synced = report.fork_synced,
        full_applied = report.full_applied,
        fork_applied = report.fork_applied,
        window = report.ledger.len(),
        "Sync finished"
    );
    Ok(())
}

#[derive(Serialize)]
struct Status {
    full_synced: Option<u64>,
    last_synced: Option<u64>,
    fork_window: Vec<u64>,
    tx_total: u64,
    address_total: u64,
    erc20_total: u64,
    erc721_total: u64,
    erc1155_total: u64,
}

async fn cmd_status(cfg: &AppConfig) -> Result<()> {
    let (full, fork) = open_stores(cfg).await?;
    let full_reader = ChainReader::new(full.clone());
    let reader = full_reader.clone().with_fork(fork.clone());
    let home = full_reader.home().await?.unwrap_or_default();
    let engine = ApplyEngine::open(full, fork, cfg.sync.baseline_cache_capacity).await?;

    let status = Status {
        full_synced: full_reader.last_synced().await?,
        last_synced: reader.last_synced().await?,
        fork_window: engine.ledger().heights(),
        tx_total: home.tx_total,
        address_total: home.address_total,
        erc20_total: home.erc20_total,
        erc721_total: home.erc721_total,
        erc1155_total: home.erc1155_total,
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn cmd_info(cfg: &AppConfig) -> Result<()> {
    println!("chainscan v{}", env!("CARGO_PKG_VERSION"));
    println!("  RPC endpoint:     {}", cfg.rpc_url);
    println!("  Full store:       {}", cfg.full_db().display());
    println!("  Fork store:       {}", cfg.fork_db().display());
    println!("  Chain:            {}", cfg.sync.chain);
    println!("  Fork depth:       {} blocks", cfg.sync.fork_depth);
    println!("  Workers:          {}", cfg.sync.workers);
    println!("  From block:       {}", cfg.sync.from_block);
    match cfg.sync.to_block {
        Some(to) => println!("  To block:         {to}"),
        None => println!("  To block:         follow head"),
    }
    println!("  Fetch balances:   {}", cfg.sync.fetch_balances);
    println!("\n[config]\n{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
