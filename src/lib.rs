//! Blockchain transaction lifecycle monitor library.

pub mod blockchain;
pub mod config;
pub mod explorer;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod persistence;
pub mod resilience;

pub use config::schema::MonitorConfig;
pub use lifecycle::Shutdown;
pub use monitor::{TxHandle, TxMonitor, TxRecord, TxStatus};
