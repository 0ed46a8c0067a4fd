//! Transaction lifecycle monitor.
//!
//! # Data Flow
//! ```text
//! watch_and_send(submit)
//!     → registry: WaitingForApproval
//!     → submit resolves → Propagating
//!     → poller: visible on the node → WaitingForConfirmation
//!     → every block (ticker): reconcile nonce index → fetch receipt
//!     → Success (confirmations tick up) / Failure / Error
//!
//! Every transition:
//!     → registry upsert → codec snapshot → key-value store
//! ```
//!
//! # Design Decisions
//! - One spawned task per watched transaction, no shared worker pool
//! - The registry is the single mutation point; statuses never regress
//! - Explorer and persistence failures are logged and fail open

pub mod error;
pub mod machine;
pub mod poller;
pub mod ports;
pub mod reconciler;
pub mod registry;
pub mod service;
pub mod ticker;
pub mod types;

pub use error::{MonitorError, MonitorResult};
pub use machine::confirmations;
pub use ports::{BroadcastError, ChainReader, ExternalTx, ExternalTxSource};
pub use reconciler::{Classification, NonceIndex, NonceIndexCache};
pub use registry::{RegistryChange, TransactionRegistry};
pub use service::{MonitorSettings, TxHandle, TxMonitor};
pub use ticker::{block_channel, BlockFeed, BlockPublisher, BlockTicker};
pub use types::{
    MetaValue, RebroadcastStatus, ReceiptLike, TransactionLike, TxCommon, TxMeta, TxRecord,
    TxState, TxStatus,
};
