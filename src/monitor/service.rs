//! Monitor façade.
//!
//! Owns the registry and the shared nonce index, and spawns one state
//! machine task per watched transaction.

use alloy::primitives::{Address, TxHash};
use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::config::WatchConfig;
use crate::monitor::error::MonitorResult;
use crate::monitor::machine::{TxStateMachine, WatchContext};
use crate::monitor::poller::{DEFAULT_POLL_CEILING, DEFAULT_POLL_INTERVAL};
use crate::monitor::ports::{BroadcastError, ChainReader, ExternalTxSource};
use crate::monitor::reconciler::NonceIndexCache;
use crate::monitor::registry::{RegistryChange, TransactionRegistry};
use crate::monitor::ticker::BlockFeed;
use crate::monitor::types::{TxCommon, TxMeta, TxRecord, TxState};
use crate::persistence::store::KeyValueStore;

/// Per-watch timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub poll_ceiling: Duration,
    pub safe_confirmations: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_ceiling: DEFAULT_POLL_CEILING,
            safe_confirmations: 12,
        }
    }
}

impl From<&WatchConfig> for MonitorSettings {
    fn from(config: &WatchConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            poll_ceiling: config.poll_ceiling(),
            safe_confirmations: config.safe_confirmations,
        }
    }
}

/// Live view of one watched transaction.
#[derive(Debug, Clone)]
pub struct TxHandle {
    tx_no: u64,
    rx: watch::Receiver<TxRecord>,
}

impl TxHandle {
    pub fn tx_no(&self) -> u64 {
        self.tx_no
    }

    /// Latest state of the record.
    pub fn current(&self) -> TxRecord {
        self.rx.borrow().clone()
    }

    /// Wait for the next update. `None` once the watch has ended.
    pub async fn changed(&mut self) -> Option<TxRecord> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the record satisfies `predicate`, including its current
    /// value. `None` if the watch ends first.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&TxRecord) -> bool) -> Option<TxRecord> {
        self.rx.wait_for(predicate).await.ok().map(|record| record.clone())
    }

    /// Wait for a terminal status.
    pub async fn wait_until_done(&mut self) -> Option<TxRecord> {
        self.wait_for(TxRecord::is_done).await
    }
}

pub struct TxMonitor {
    ctx: Arc<WatchContext>,
    /// Loaded at construction, handed out by [`TxMonitor::restore`].
    resumable: Mutex<Vec<TxRecord>>,
}

impl TxMonitor {
    /// Build a monitor and load the persisted snapshot from `store`.
    ///
    /// Loading happens here so that numbers handed out by
    /// [`TxMonitor::watch_and_send`] never collide with persisted ones. Pending
    /// watches only start on [`TxMonitor::restore`].
    pub fn new(
        chain: Arc<dyn ChainReader>,
        explorer: Arc<dyn ExternalTxSource>,
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        blocks: BlockFeed,
        settings: MonitorSettings,
    ) -> Self {
        let ctx = WatchContext {
            chain,
            nonce_index: Arc::new(NonceIndexCache::new(explorer)),
            registry: Arc::new(TransactionRegistry::new(store, key)),
            blocks,
            poll_interval: settings.poll_interval,
            poll_ceiling: settings.poll_ceiling,
            safe_confirmations: settings.safe_confirmations,
        };
        let resumable = ctx.registry.hydrate().unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to load persisted transactions");
            Vec::new()
        });
        Self {
            ctx: Arc::new(ctx),
            resumable: Mutex::new(resumable),
        }
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.ctx.registry
    }

    /// Track a transaction from the moment it is handed to the wallet.
    ///
    /// The record is registered as `WaitingForApproval` before `submit` is
    /// polled; the rest of the lifecycle runs on a spawned task.
    pub fn watch_and_send<F>(
        &self,
        account: Address,
        network_id: impl Into<String>,
        meta: TxMeta,
        submit: F,
    ) -> TxHandle
    where
        F: Future<Output = Result<TxHash, BroadcastError>> + Send + 'static,
    {
        let now = Utc::now();
        let record = TxRecord {
            common: TxCommon {
                tx_no: self.ctx.registry.allocate_tx_no(),
                account,
                network_id: network_id.into(),
                meta,
                start: now,
                last_change: now,
                end: None,
                dismissed: false,
            },
            state: TxState::WaitingForApproval,
        };
        let tx_no = record.tx_no();
        tracing::debug!(tx_no = tx_no, account = %account, "Watching new transaction");

        let (machine, rx) = TxStateMachine::new(record, self.ctx.clone());
        tokio::spawn(machine.send(submit));
        TxHandle { tx_no, rx }
    }

    /// Resume every persisted watch that was still pending. Later calls
    /// return nothing.
    pub fn restore(&self) -> Vec<TxHandle> {
        let resumable = std::mem::take(
            &mut *self
                .resumable
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        resumable
            .into_iter()
            .map(|record| {
                let tx_no = record.tx_no();
                let (machine, rx) = TxStateMachine::new(record, self.ctx.clone());
                tokio::spawn(machine.resume());
                TxHandle { tx_no, rx }
            })
            .collect()
    }

    pub fn list_transactions(&self, account: &Address, network_id: &str) -> Vec<TxRecord> {
        self.ctx.registry.list_for(account, network_id)
    }

    pub fn dismiss(&self, tx_no: u64) -> MonitorResult<()> {
        self.ctx.registry.dismiss(tx_no)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.ctx.registry.subscribe()
    }

    /// Write a final snapshot.
    pub fn shutdown(&self) -> MonitorResult<()> {
        self.ctx.registry.flush()?;
        tracing::info!(records = self.ctx.registry.len(), "Monitor flushed");
        Ok(())
    }
}
