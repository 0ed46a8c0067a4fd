//! Receipt polling.
//!
//! Polls once per interval until the transaction becomes visible, bounded by
//! a hard ceiling. When the ceiling passes the watch just stops: the record
//! keeps its last non-terminal status.

use alloy::primitives::TxHash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use crate::blockchain::types::BlockchainResult;
use crate::monitor::ports::ChainReader;
use crate::monitor::types::{ReceiptLike, TransactionLike};

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default ceiling after which an unresolved watch stops.
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_secs(30 * 60);

pub struct ReceiptPoller {
    chain: Arc<dyn ChainReader>,
    poll_interval: Duration,
    deadline: Instant,
}

impl ReceiptPoller {
    /// The ceiling starts counting now.
    pub fn new(chain: Arc<dyn ChainReader>, poll_interval: Duration, ceiling: Duration) -> Self {
        Self {
            chain,
            poll_interval,
            deadline: Instant::now() + ceiling,
        }
    }

    /// When this watch gives up.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Wait until the node knows about `hash`.
    ///
    /// `Ok(None)` means the ceiling elapsed first. The first poll happens
    /// immediately; a poll error ends the wait.
    pub async fn wait_for_transaction(
        &self,
        hash: TxHash,
    ) -> BlockchainResult<Option<TransactionLike>> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = sleep_until(self.deadline) => {
                    tracing::info!(tx_hash = %hash, "Poll ceiling reached before the transaction became visible");
                    return Ok(None);
                }
            }

            match self.chain.transaction(hash).await? {
                Some(transaction) => return Ok(Some(transaction)),
                None => tracing::trace!(tx_hash = %hash, "Transaction not visible yet"),
            }
        }
    }

    /// A receipt for `hash`, once it is mined.
    pub async fn fetch_receipt(&self, hash: TxHash) -> BlockchainResult<Option<ReceiptLike>> {
        self.chain.receipt(hash).await
    }
}
