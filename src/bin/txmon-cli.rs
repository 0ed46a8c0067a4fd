use alloy::primitives::{Address, TxHash};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use txmon::blockchain::BlockchainClient;
use txmon::config::load_config;
use txmon::explorer::{DisabledExplorer, EtherscanClient};
use txmon::lifecycle::Shutdown;
use txmon::monitor::{
    BlockTicker, ChainReader, ExternalTxSource, MonitorSettings, TransactionRegistry, TxMeta,
    TxMonitor, TxRecord, TxState,
};
use txmon::persistence::{FileStore, KeyValueStore, MemoryStore};

#[derive(Parser)]
#[command(name = "txmon-cli")]
#[command(about = "Operator CLI for the transaction monitor", long_about = None)]
struct Cli {
    /// Snapshot file written by txmond.
    #[arg(short, long, default_value = "txmon-store.json")]
    store: PathBuf,

    /// Key the snapshot is stored under.
    #[arg(short, long, default_value = "transactions")]
    key: String,

    /// Configuration used by `watch`.
    #[arg(short, long, default_value = "txmon.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List persisted transactions for an account on a network
    List {
        #[arg(long)]
        account: String,
        #[arg(long, default_value = "1")]
        network: String,
    },
    /// Hide a transaction from listings
    Dismiss { tx_no: u64 },
    /// Follow an already broadcast transaction until it settles
    Watch {
        #[arg(long)]
        account: String,
        #[arg(long)]
        hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List { account, network } => {
            let account: Address = account.parse()?;
            let registry = open_registry(&cli.store, &cli.key)?;
            let listed: Vec<Value> = registry
                .list_for(&account, &network)
                .iter()
                .map(describe)
                .collect();
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
        Commands::Dismiss { tx_no } => {
            let registry = open_registry(&cli.store, &cli.key)?;
            registry.dismiss(tx_no)?;
            println!("Dismissed transaction {}", tx_no);
        }
        Commands::Watch { account, hash } => {
            let account: Address = account.parse()?;
            let hash: TxHash = hash.parse()?;
            watch(&cli.config, account, hash).await?;
        }
    }

    Ok(())
}

fn open_registry(
    path: &Path,
    key: &str,
) -> Result<TransactionRegistry, Box<dyn std::error::Error>> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(path));
    let registry = TransactionRegistry::new(store, key);
    registry.hydrate()?;
    Ok(registry)
}

async fn watch(
    config_path: &Path,
    account: Address,
    hash: TxHash,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    let chain: Arc<dyn ChainReader> =
        Arc::new(BlockchainClient::new(config.blockchain.clone()).await?);
    let explorer: Arc<dyn ExternalTxSource> = if config.explorer.enabled {
        Arc::new(EtherscanClient::new(config.explorer.clone())?)
    } else {
        Arc::new(DisabledExplorer)
    };

    let shutdown = Shutdown::new();
    let (ticker, blocks) = BlockTicker::new(chain.clone(), config.blockchain.block_poll_interval());
    tokio::spawn(ticker.run(shutdown.subscribe()));

    // Watches started here are not written to the daemon's snapshot.
    let monitor = TxMonitor::new(
        chain,
        explorer,
        Arc::new(MemoryStore::new()),
        config.persistence.key.clone(),
        blocks,
        MonitorSettings::from(&config.monitor),
    );

    let meta = TxMeta::new().with("source", "txmon-cli");
    let network_id = config.monitor.network_id.clone();
    let mut handle = monitor.watch_and_send(account, network_id, meta, async move { Ok(hash) });

    println!("{}", serde_json::to_string_pretty(&describe(&handle.current()))?);
    while let Some(record) = handle.changed().await {
        println!("{}", serde_json::to_string_pretty(&describe(&record))?);
    }

    shutdown.trigger();
    Ok(())
}

fn describe(record: &TxRecord) -> Value {
    let mut value = json!({
        "txNo": record.tx_no(),
        "status": record.status().as_str(),
        "hash": record.tx_hash().map(|h| h.to_string()),
        "start": record.common.start.to_rfc3339(),
        "lastChange": record.common.last_change.to_rfc3339(),
        "dismissed": record.common.dismissed,
    });

    match &record.state {
        TxState::Success {
            block_number,
            confirmations,
            safe_confirmations,
            rebroadcast,
            ..
        } => {
            value["blockNumber"] = json!(block_number);
            value["confirmations"] = json!(confirmations);
            value["safeConfirmations"] = json!(safe_confirmations);
            value["rebroadcast"] = json!(rebroadcast.map(|r| r.as_str()));
        }
        TxState::Failure {
            block_number,
            rebroadcast,
            ..
        } => {
            value["blockNumber"] = json!(block_number);
            value["rebroadcast"] = json!(rebroadcast.map(|r| r.as_str()));
        }
        TxState::Error { error, .. } | TxState::CancelledByTheUser { error } => {
            value["error"] = json!(error);
        }
        _ => {}
    }
    value
}
