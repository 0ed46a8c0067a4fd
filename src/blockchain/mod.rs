//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! MonitorConfig.blockchain (RPC URL, failovers, timeout)
//!     → client.rs (RPC connection with timeouts and failover)
//!     → ChainReader (block numbers, transactions, receipts)
//!     → monitor (ticker, poller, state machine)
//! ```
//!
//! # Constraints
//! - Read-only: the monitor never signs or sends transactions
//! - All RPC calls have configurable timeouts
//! - Graceful degradation when blockchain unreachable

pub mod client;
pub mod types;

pub use client::BlockchainClient;
pub use types::{BlockchainConfig, BlockchainError, BlockchainResult, ChainId};
