//! Errors surfaced by the monitor's public operations.

use thiserror::Error;

use crate::persistence::codec::CodecError;
use crate::persistence::store::StoreError;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// `dismiss` was called with a transaction number the registry never saw.
    #[error("No transaction with number {0}")]
    RecordNotFound(u64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
