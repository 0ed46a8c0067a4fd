//! Outbound ports.
//!
//! Traits for the collaborators the monitor depends on but does not own:
//! chain reads, explorer history and the broadcast step.

use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use thiserror::Error;

use crate::blockchain::types::BlockchainResult;
use crate::explorer::ExplorerError;
use crate::monitor::types::{ReceiptLike, TransactionLike};

/// Read access to the chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Latest block number.
    async fn block_number(&self) -> BlockchainResult<u64>;

    /// Look up a transaction; `None` while it is not visible to the node.
    async fn transaction(&self, hash: TxHash) -> BlockchainResult<Option<TransactionLike>>;

    /// Look up a receipt; `None` until the transaction is mined.
    async fn receipt(&self, hash: TxHash) -> BlockchainResult<Option<ReceiptLike>>;
}

/// A transaction as reported by an explorer's account history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTx {
    pub nonce: u64,
    pub hash: TxHash,
    pub call_data: Bytes,
}

/// Explorer-style account history.
#[async_trait]
pub trait ExternalTxSource: Send + Sync {
    async fn transactions_for_account(
        &self,
        account: Address,
        since_block: u64,
    ) -> Result<Vec<ExternalTx>, ExplorerError>;

    /// `false` when there is no history to consult; reconciliation is skipped.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// The broadcast step failed before a hash existed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// The user declined the signing prompt.
    #[error("User denied transaction signature: {0}")]
    UserRejected(String),

    /// Any other wallet or node error raised while broadcasting.
    #[error("Broadcast failed: {0}")]
    Wallet(String),
}
