//! Block tick source.
//!
//! The latest block number is published through a `watch` channel: watches
//! that fall behind skip straight to the newest block, and published numbers
//! only ever increase.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;

use crate::monitor::ports::ChainReader;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Upper bound for the retry delay after RPC failures.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Create a connected publisher and feed.
pub fn block_channel() -> (BlockPublisher, BlockFeed) {
    let (tx, rx) = watch::channel(None);
    (BlockPublisher { tx }, BlockFeed { rx })
}

/// Write side of the block channel.
#[derive(Debug)]
pub struct BlockPublisher {
    tx: watch::Sender<Option<u64>>,
}

impl BlockPublisher {
    /// Publish `block` if it is newer than the last one. Returns whether it was.
    pub fn publish(&self, block: u64) -> bool {
        self.tx.send_if_modified(|latest| match latest {
            Some(current) if *current >= block => false,
            _ => {
                *latest = Some(block);
                true
            }
        })
    }

    pub fn latest(&self) -> Option<u64> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> BlockFeed {
        BlockFeed {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the block channel; cheap to clone, one per watch.
#[derive(Debug, Clone)]
pub struct BlockFeed {
    rx: watch::Receiver<Option<u64>>,
}

impl BlockFeed {
    /// Latest published block without waiting.
    pub fn latest(&self) -> Option<u64> {
        *self.rx.borrow()
    }

    /// Latest block, waiting for the first one if nothing was published yet.
    /// `None` once the publisher is gone.
    pub async fn current(&mut self) -> Option<u64> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(block) => *block,
            Err(_) => None,
        }
    }

    /// Wait for a block newer than the last one this feed has seen.
    pub async fn next(&mut self) -> Option<u64> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(block) = *self.rx.borrow_and_update() {
                return Some(block);
            }
        }
    }
}

/// Polls the node for new blocks and publishes them.
pub struct BlockTicker {
    chain: Arc<dyn ChainReader>,
    interval: Duration,
    publisher: BlockPublisher,
}

impl BlockTicker {
    pub fn new(chain: Arc<dyn ChainReader>, interval: Duration) -> (Self, BlockFeed) {
        let (publisher, feed) = block_channel();
        (
            Self {
                chain,
                interval,
                publisher,
            },
            feed,
        )
    }

    pub fn subscribe(&self) -> BlockFeed {
        self.publisher.subscribe()
    }

    /// Run until shutdown. RPC failures back off and are retried forever.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Block ticker starting");

        let base_ms = self.interval.as_millis() as u64;
        let mut failures = 0u32;

        loop {
            let delay = match self.chain.block_number().await {
                Ok(block) => {
                    failures = 0;
                    if self.publisher.publish(block) {
                        metrics::record_latest_block(block);
                        tracing::debug!(block = block, "New block");
                    }
                    self.interval
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = calculate_backoff(failures, base_ms, MAX_BACKOFF_MS.max(base_ms));
                    tracing::warn!(
                        error = %e,
                        attempt = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to fetch block number"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Block ticker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
