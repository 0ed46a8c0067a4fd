//! txmond: transaction lifecycle monitor daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                      TXMOND                      │
//!                 │                                                  │
//!   RPC node ◀────┼── BlockTicker ──▶ BlockFeed ──┐                  │
//!      ▲          │                               ▼                  │
//!      └──────────┼── ReceiptPoller ◀── TxStateMachine (per tx) ──┐  │
//!                 │                               │               │  │
//!   Explorer ◀────┼── NonceIndexCache ◀───────────┘               ▼  │
//!                 │                                  TransactionRegistry
//!                 │                                         │        │
//!                 │                                  codec → FileStore
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! On start the daemon reloads the persisted list and resumes every watch
//! that was still pending. On SIGINT/SIGTERM it stops the ticker and writes
//! a final snapshot.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use txmon::blockchain::BlockchainClient;
use txmon::config::load_config;
use txmon::explorer::{DisabledExplorer, EtherscanClient};
use txmon::lifecycle::{wait_for_shutdown_signal, Shutdown};
use txmon::monitor::{BlockTicker, ChainReader, ExternalTxSource, MonitorSettings, TxMonitor};
use txmon::observability::{logging, metrics};
use txmon::persistence::{FileStore, KeyValueStore};

#[derive(Parser)]
#[command(name = "txmond")]
#[command(about = "Blockchain transaction lifecycle monitor", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "txmon.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init(&config.observability);
    tracing::info!(config = %args.config.display(), "txmond v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let chain: Arc<dyn ChainReader> =
        Arc::new(BlockchainClient::new(config.blockchain.clone()).await?);

    let explorer: Arc<dyn ExternalTxSource> = if config.explorer.enabled {
        Arc::new(EtherscanClient::new(config.explorer.clone())?)
    } else {
        tracing::info!("Explorer disabled, rebroadcasts will not be detected");
        Arc::new(DisabledExplorer)
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.persistence.path));

    let shutdown = Shutdown::new();
    let (ticker, blocks) = BlockTicker::new(chain.clone(), config.blockchain.block_poll_interval());
    let ticker_task = tokio::spawn(ticker.run(shutdown.subscribe()));

    let monitor = TxMonitor::new(
        chain,
        explorer,
        store,
        config.persistence.key.clone(),
        blocks,
        MonitorSettings::from(&config.monitor),
    );

    let resumed = monitor.restore();
    tracing::info!(
        resumed = resumed.len(),
        known = monitor.registry().len(),
        store = %config.persistence.path,
        "Monitor ready"
    );

    wait_for_shutdown_signal().await;

    shutdown.trigger();
    if let Err(e) = ticker_task.await {
        tracing::error!(error = %e, "Block ticker task failed");
    }
    monitor.shutdown()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
