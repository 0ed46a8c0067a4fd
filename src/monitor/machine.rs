//! Transaction state machine.
//!
//! # States
//! ```text
//! WaitingForApproval ──hash──▶ Propagating ──visible──▶ WaitingForConfirmation
//!        │                                                      │
//!        └─broadcast error─▶ CancelledByTheUser                 ├─receipt ok──▶ Success (confirmations tick up)
//!                                                               ├─receipt reverted──▶ Failure
//!                             any poll error ─▶ Error ◀─────────┘
//! ```
//!
//! One machine runs per watched transaction, as its own task. Every
//! transition is written to the registry before the next observation is
//! made, so a single transaction's history is strictly ordered.

use alloy::primitives::TxHash;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep_until;

use crate::blockchain::types::BlockchainError;
use crate::monitor::poller::ReceiptPoller;
use crate::monitor::ports::{BroadcastError, ChainReader};
use crate::monitor::reconciler::NonceIndexCache;
use crate::monitor::registry::TransactionRegistry;
use crate::monitor::ticker::BlockFeed;
use crate::monitor::types::{RebroadcastStatus, ReceiptLike, TxRecord, TxState, TxStatus};
use crate::observability::metrics;

/// Everything a machine needs besides its own record.
pub(crate) struct WatchContext {
    pub chain: Arc<dyn ChainReader>,
    pub nonce_index: Arc<NonceIndexCache>,
    pub registry: Arc<TransactionRegistry>,
    pub blocks: BlockFeed,
    pub poll_interval: Duration,
    pub poll_ceiling: Duration,
    pub safe_confirmations: u64,
}

pub(crate) struct TxStateMachine {
    record: TxRecord,
    ctx: Arc<WatchContext>,
    updates: watch::Sender<TxRecord>,
}

impl TxStateMachine {
    /// Register `record` as-is and return the machine plus a feed of its updates.
    pub fn new(record: TxRecord, ctx: Arc<WatchContext>) -> (Self, watch::Receiver<TxRecord>) {
        let record = ctx.registry.upsert(record.clone()).unwrap_or(record);
        let (updates, rx) = watch::channel(record.clone());
        (
            Self {
                record,
                ctx,
                updates,
            },
            rx,
        )
    }

    /// Drive a fresh record through the broadcast step and on to an outcome.
    pub async fn send<F>(mut self, submit: F)
    where
        F: Future<Output = Result<TxHash, BroadcastError>>,
    {
        match submit.await {
            Ok(tx_hash) => {
                self.transition(TxState::Propagating {
                    tx_hash,
                    broadcasted_at: Utc::now(),
                });
                self.monitor(tx_hash).await;
            }
            Err(e) => {
                match &e {
                    BroadcastError::UserRejected(_) => {
                        tracing::debug!(tx_no = self.record.tx_no(), "User rejected the transaction")
                    }
                    BroadcastError::Wallet(_) => {
                        tracing::warn!(tx_no = self.record.tx_no(), error = %e, "Broadcast failed")
                    }
                }
                self.transition(TxState::CancelledByTheUser {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Continue a persisted record from the status it was saved in.
    pub async fn resume(mut self) {
        match self.record.tx_hash() {
            Some(tx_hash) if self.record.status().is_pending() => {
                tracing::info!(
                    tx_no = self.record.tx_no(),
                    tx_hash = %tx_hash,
                    status = %self.record.status(),
                    "Resuming watch"
                );
                self.monitor(tx_hash).await;
            }
            _ => tracing::warn!(
                tx_no = self.record.tx_no(),
                status = %self.record.status(),
                "Record is not resumable"
            ),
        }
    }

    async fn monitor(&mut self, tx_hash: TxHash) {
        metrics::watch_started();
        self.watch(tx_hash).await;
        metrics::watch_finished();
    }

    async fn watch(&mut self, tx_hash: TxHash) {
        let poller = ReceiptPoller::new(
            self.ctx.chain.clone(),
            self.ctx.poll_interval,
            self.ctx.poll_ceiling,
        );

        let transaction = match poller.wait_for_transaction(tx_hash).await {
            Ok(Some(transaction)) => transaction,
            Ok(None) => return,
            Err(e) => return self.fail(tx_hash, e),
        };

        if self.record.status() == TxStatus::Propagating {
            let broadcasted_at = self.record.state.broadcasted_at().unwrap_or_else(Utc::now);
            self.transition(TxState::WaitingForConfirmation {
                tx_hash,
                broadcasted_at,
            });
        }

        let mut blocks = self.ctx.blocks.clone();
        let mut block = tokio::select! {
            current = blocks.current() => match current {
                Some(block) => block,
                None => return,
            },
            _ = sleep_until(poller.deadline()) => return self.give_up(tx_hash),
        };

        let account = self.record.common.account;
        let (receipt, rebroadcast) = loop {
            let classification = self
                .ctx
                .nonce_index
                .reconcile(account, block, &transaction)
                .await;
            let hash = classification.hash_to_watch(transaction.hash);

            match poller.fetch_receipt(hash).await {
                Ok(Some(receipt)) => break (receipt, classification.rebroadcast()),
                Ok(None) => tracing::trace!(tx_hash = %hash, block = block, "No receipt yet"),
                Err(e) => return self.fail(hash, e),
            }

            block = tokio::select! {
                next = blocks.next() => match next {
                    Some(block) => block,
                    None => return,
                },
                _ = sleep_until(poller.deadline()) => return self.give_up(tx_hash),
            };
        };

        self.settle(receipt, rebroadcast, blocks).await;
    }

    /// Record the outcome. A success is re-emitted on every new block until
    /// it reaches the safe confirmation depth.
    async fn settle(
        &mut self,
        receipt: ReceiptLike,
        rebroadcast: Option<RebroadcastStatus>,
        mut blocks: BlockFeed,
    ) {
        if let Some(kind) = rebroadcast {
            metrics::record_rebroadcast(kind.as_str());
        }

        let tx_hash = receipt.transaction_hash;
        let block_number = receipt.block_number;

        if !receipt.status {
            self.transition(TxState::Failure {
                tx_hash,
                block_number,
                receipt,
                rebroadcast,
            });
            return;
        }

        let safe_confirmations = self.ctx.safe_confirmations;
        let mut current = blocks.latest().unwrap_or(block_number);
        loop {
            let confirmations = confirmations(current, block_number);
            self.transition(TxState::Success {
                tx_hash,
                block_number,
                receipt: receipt.clone(),
                confirmations,
                safe_confirmations,
                rebroadcast,
            });
            if confirmations >= safe_confirmations {
                break;
            }
            match blocks.next().await {
                Some(block) => current = block,
                None => break,
            }
        }
    }

    fn fail(&mut self, tx_hash: TxHash, error: BlockchainError) {
        tracing::error!(
            tx_no = self.record.tx_no(),
            tx_hash = %tx_hash,
            error = %error,
            "Chain read failed while watching transaction"
        );
        self.transition(TxState::Error {
            tx_hash,
            error: error.to_string(),
        });
    }

    fn give_up(&self, tx_hash: TxHash) {
        tracing::info!(
            tx_no = self.record.tx_no(),
            tx_hash = %tx_hash,
            status = %self.record.status(),
            "Poll ceiling reached, watch stopped"
        );
    }

    fn transition(&mut self, state: TxState) {
        let now = Utc::now();
        let previous = self.record.status();
        let status = state.status();

        let mut next = self.record.clone();
        next.state = state;
        next.common.last_change = now;
        if status.is_done() && next.common.end.is_none() {
            next.common.end = Some(now);
        }

        let Some(stored) = self.ctx.registry.upsert(next) else {
            return;
        };
        self.record = stored;
        self.updates.send_replace(self.record.clone());

        if previous != status {
            metrics::record_transition(status.as_str());
            tracing::info!(
                tx_no = self.record.tx_no(),
                tx_hash = ?self.record.tx_hash(),
                from = %previous,
                to = %status,
                "Transaction status changed"
            );
        }
    }
}

/// Blocks mined on top of the receipt's block; never negative.
pub fn confirmations(current_block: u64, receipt_block: u64) -> u64 {
    current_block.saturating_sub(receipt_block)
}
