//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the transaction monitor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    /// JSON-RPC connectivity.
    pub blockchain: BlockchainConfig,

    /// Block explorer used to detect rebroadcasts.
    pub explorer: ExplorerConfig,

    /// Watch timing and confirmation depth.
    pub monitor: WatchConfig,

    /// Where the transaction snapshot is written.
    pub persistence: PersistenceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// How often the block ticker asks for the latest block number.
    pub block_poll_interval_ms: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            block_poll_interval_ms: 4000,
        }
    }
}

impl BlockchainConfig {
    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }
}

/// Etherscan-compatible explorer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Enable rebroadcast detection through the explorer.
    pub enabled: bool,

    /// API base URL (e.g., "https://api.etherscan.io/api").
    pub api_url: String,

    /// API key appended to every request.
    pub api_key: String,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.etherscan.io/api".to_string(),
            api_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

/// Per-transaction watch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Network identifier stamped on records created by this process.
    pub network_id: String,

    /// Interval between transaction lookups while propagating.
    pub poll_interval_ms: u64,

    /// Hard ceiling after which an unresolved watch stops silently.
    pub poll_ceiling_secs: u64,

    /// Block depth after which a success is treated as final.
    pub safe_confirmations: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            network_id: "1".to_string(),
            poll_interval_ms: 1000,
            poll_ceiling_secs: 30 * 60,
            safe_confirmations: 12,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_ceiling(&self) -> Duration {
        Duration::from_secs(self.poll_ceiling_secs)
    }
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Path of the JSON key-value file.
    pub path: String,

    /// Key the transaction snapshot is stored under.
    pub key: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: "txmon-store.json".to_string(),
            key: "transactions".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for terminals, JSON for log shippers.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
