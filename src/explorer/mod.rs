//! Block explorer integration.
//!
//! The explorer's view of an account's history is the only place a
//! replacement transaction (speed-up or cancel) shows up under the original
//! nonce, so the rebroadcast reconciler reads it through [`ExternalTxSource`].
//!
//! [`ExternalTxSource`]: crate::monitor::ports::ExternalTxSource

pub mod client;

use thiserror::Error;

pub use client::{DisabledExplorer, EtherscanClient};

/// Errors raised while querying the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplorerError {
    /// Transport failure or non-success HTTP status.
    #[error("Explorer HTTP error: {0}")]
    Http(String),

    /// The API answered with an error status.
    #[error("Explorer API error (status {status}): {detail}")]
    Api { status: String, detail: String },

    /// The payload did not have the expected shape.
    #[error("Malformed explorer response: {0}")]
    Malformed(String),
}
