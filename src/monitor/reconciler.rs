//! Rebroadcast reconciliation.
//!
//! Wallets replace a pending transaction by re-sending with the same nonce:
//! a speed-up keeps the call data, a cancel swaps it for a no-op. The
//! replacement has a new hash, so the only way to follow it is to look up the
//! account's nonce in the explorer's history and compare.

use alloy::primitives::{Address, TxHash};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::monitor::ports::{ExternalTx, ExternalTxSource};
use crate::monitor::types::{RebroadcastStatus, TransactionLike};
use crate::observability::metrics;

/// Outcome of comparing a local transaction against the explorer's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The explorer has the same hash under this nonce.
    Unchanged,
    /// The explorer has nothing under this nonce (yet, or anymore).
    NotFound,
    /// Replaced by a transaction with the same call data.
    Speedup(TxHash),
    /// Replaced by a transaction with different call data.
    Cancel(TxHash),
}

impl Classification {
    /// The hash whose receipt decides the outcome. A replacement always wins.
    pub fn hash_to_watch(&self, local: TxHash) -> TxHash {
        match self {
            Classification::Speedup(hash) | Classification::Cancel(hash) => *hash,
            Classification::Unchanged | Classification::NotFound => local,
        }
    }

    /// Classification as recorded on the transaction record.
    pub fn rebroadcast(&self) -> Option<RebroadcastStatus> {
        match self {
            Classification::Unchanged => None,
            Classification::NotFound => Some(RebroadcastStatus::Lost),
            Classification::Speedup(_) => Some(RebroadcastStatus::Speedup),
            Classification::Cancel(_) => Some(RebroadcastStatus::Cancel),
        }
    }
}

/// An account's externally observed transactions, keyed by nonce.
#[derive(Debug, Clone, Default)]
pub struct NonceIndex {
    by_nonce: HashMap<u64, ExternalTx>,
}

impl NonceIndex {
    /// Later entries win when a nonce repeats.
    pub fn from_transactions(transactions: impl IntoIterator<Item = ExternalTx>) -> Self {
        Self {
            by_nonce: transactions.into_iter().map(|tx| (tx.nonce, tx)).collect(),
        }
    }

    pub fn get(&self, nonce: u64) -> Option<&ExternalTx> {
        self.by_nonce.get(&nonce)
    }

    pub fn len(&self) -> usize {
        self.by_nonce.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_nonce.is_empty()
    }

    pub fn classify(&self, local: &TransactionLike) -> Classification {
        match self.by_nonce.get(&local.nonce) {
            None => Classification::NotFound,
            Some(external) if external.hash == local.hash => Classification::Unchanged,
            Some(external) if external.call_data == local.input => {
                Classification::Speedup(external.hash)
            }
            Some(external) => Classification::Cancel(external.hash),
        }
    }
}

struct CachedIndex {
    block: u64,
    index: Arc<NonceIndex>,
}

/// Per-account cache entry. The async mutex serializes refreshes so that
/// concurrent watches on one account trigger a single explorer query.
struct AccountIndex {
    since_block: u64,
    cached: Mutex<Option<CachedIndex>>,
}

/// Nonce indexes shared by every watch, one per account, refreshed at most
/// once per block.
pub struct NonceIndexCache {
    source: Arc<dyn ExternalTxSource>,
    accounts: DashMap<Address, Arc<AccountIndex>>,
}

impl NonceIndexCache {
    pub fn new(source: Arc<dyn ExternalTxSource>) -> Self {
        Self {
            source,
            accounts: DashMap::new(),
        }
    }

    /// Index for `account` as of `block`.
    ///
    /// The history is requested from the first block this account was seen
    /// at. Explorer failures yield an empty index, cached for the block.
    pub async fn index_for(&self, account: Address, block: u64) -> Arc<NonceIndex> {
        let entry = self
            .accounts
            .entry(account)
            .or_insert_with(|| {
                Arc::new(AccountIndex {
                    since_block: block,
                    cached: Mutex::new(None),
                })
            })
            .clone();

        let mut cached = entry.cached.lock().await;
        if let Some(current) = cached.as_ref() {
            if current.block >= block {
                return current.index.clone();
            }
        }

        let index = match self
            .source
            .transactions_for_account(account, entry.since_block)
            .await
        {
            Ok(transactions) => Arc::new(NonceIndex::from_transactions(transactions)),
            Err(e) => {
                tracing::warn!(
                    account = %account,
                    block = block,
                    error = %e,
                    "Explorer lookup failed, assuming no rebroadcast"
                );
                metrics::record_explorer_failure();
                Arc::new(NonceIndex::default())
            }
        };
        tracing::debug!(account = %account, block = block, entries = index.len(), "Nonce index refreshed");

        *cached = Some(CachedIndex {
            block,
            index: index.clone(),
        });
        index
    }

    /// Classify `local` against the account's index as of `block`. Without an
    /// enabled source every transaction is `Unchanged`.
    pub async fn reconcile(
        &self,
        account: Address,
        block: u64,
        local: &TransactionLike,
    ) -> Classification {
        if !self.source.is_enabled() {
            return Classification::Unchanged;
        }
        let classification = self.index_for(account, block).await.classify(local);
        if let Classification::Speedup(hash) | Classification::Cancel(hash) = classification {
            tracing::info!(
                account = %account,
                nonce = local.nonce,
                original = %local.hash,
                replacement = %hash,
                ?classification,
                "Transaction was rebroadcast"
            );
        }
        classification
    }
}
