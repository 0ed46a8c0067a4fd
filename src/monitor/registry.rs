//! Transaction registry.
//!
//! Ordered collection of every record seen this session. All mutation goes
//! through one mutex, and every successful mutation writes a snapshot of the
//! persistable records while that lock is still held, so snapshots land in
//! mutation order. A registry holding nothing persistable never writes, so
//! it cannot overwrite an earlier session's snapshot.

use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::monitor::error::{MonitorError, MonitorResult};
use crate::monitor::types::TxRecord;
use crate::observability::metrics;
use crate::persistence::codec;
use crate::persistence::store::KeyValueStore;

/// Capacity of the change feed; slow subscribers see `Lagged`.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Notification sent to registry subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryChange {
    Upserted(TxRecord),
    Dismissed(u64),
}

#[derive(Default)]
struct RegistryState {
    records: Vec<TxRecord>,
    positions: HashMap<u64, usize>,
    last_tx_no: u64,
    hydrated: bool,
}

impl RegistryState {
    /// Insert or replace in place. `None` when the status would move backwards.
    fn apply(&mut self, mut record: TxRecord) -> Option<TxRecord> {
        let tx_no = record.tx_no();
        match self.positions.get(&tx_no).copied() {
            Some(i) => {
                let existing = &self.records[i];
                if !existing.status().can_advance_to(record.status()) {
                    tracing::warn!(
                        tx_no = tx_no,
                        from = %existing.status(),
                        to = %record.status(),
                        "Rejected status regression"
                    );
                    return None;
                }
                record.common.dismissed |= existing.common.dismissed;
                self.records[i] = record.clone();
            }
            None => {
                self.last_tx_no = self.last_tx_no.max(tx_no);
                self.positions.insert(tx_no, self.records.len());
                self.records.push(record.clone());
            }
        }
        Some(record)
    }

    fn has_persistable(&self) -> bool {
        self.records.iter().any(codec::is_persistable)
    }
}

pub struct TransactionRegistry {
    state: Mutex<RegistryState>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    changes: broadcast::Sender<RegistryChange>,
}

impl TransactionRegistry {
    /// Empty registry snapshotting into `store` under `key`.
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            state: Mutex::new(RegistryState::default()),
            store,
            key: key.into(),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Next transaction number; always above anything inserted or hydrated.
    pub fn allocate_tx_no(&self) -> u64 {
        let mut state = self.lock();
        state.last_tx_no += 1;
        state.last_tx_no
    }

    /// Insert a record or replace the one with the same number.
    ///
    /// Returns the record as stored. A replacement that would move the status
    /// backwards is rejected with `None`. The dismissed flag of the stored
    /// record is kept.
    pub fn upsert(&self, record: TxRecord) -> Option<TxRecord> {
        let mut state = self.lock();
        let record = state.apply(record)?;
        self.snapshot(&state);
        drop(state);
        let _ = self.changes.send(RegistryChange::Upserted(record.clone()));
        Some(record)
    }

    /// Hide a record from the UI. Status tracking is unaffected.
    pub fn dismiss(&self, tx_no: u64) -> MonitorResult<()> {
        let mut state = self.lock();
        let i = state
            .positions
            .get(&tx_no)
            .copied()
            .ok_or(MonitorError::RecordNotFound(tx_no))?;
        state.records[i].common.dismissed = true;

        self.snapshot(&state);
        drop(state);
        let _ = self.changes.send(RegistryChange::Dismissed(tx_no));
        Ok(())
    }

    pub fn get(&self, tx_no: u64) -> Option<TxRecord> {
        let state = self.lock();
        state.positions.get(&tx_no).map(|&i| state.records[i].clone())
    }

    /// Records for one account on one network, in insertion order.
    pub fn list_for(&self, account: &Address, network_id: &str) -> Vec<TxRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.belongs_to(account, network_id))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<TxRecord> {
        self.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }

    /// Load the persisted snapshot.
    ///
    /// Every decoded record is inserted under a single lock; the transaction
    /// counter moves past the highest persisted number. Returns the records
    /// that still need a live watch (`Propagating` / `WaitingForConfirmation`).
    ///
    /// Only the first call reads the store; later calls return nothing.
    pub fn hydrate(&self) -> MonitorResult<Vec<TxRecord>> {
        let mut state = self.lock();
        if state.hydrated {
            tracing::debug!(key = %self.key, "Registry already hydrated");
            return Ok(Vec::new());
        }
        state.hydrated = true;

        let Some(blob) = self.store.get(&self.key)? else {
            tracing::info!(key = %self.key, "No persisted transactions");
            return Ok(Vec::new());
        };
        let records = codec::decode(&blob)?;

        // The store already holds exactly these unless the session added some first.
        let had_records = !state.records.is_empty();
        let loaded: Vec<TxRecord> = records
            .into_iter()
            .filter_map(|record| state.apply(record))
            .collect();
        if had_records {
            self.snapshot(&state);
        }
        let last_tx_no = state.last_tx_no;
        let total = state.records.len();
        drop(state);

        let resumable: Vec<TxRecord> = loaded
            .iter()
            .filter(|record| record.status().is_pending())
            .cloned()
            .collect();
        for record in loaded {
            let _ = self.changes.send(RegistryChange::Upserted(record));
        }

        tracing::info!(
            loaded = total,
            resumable = resumable.len(),
            last_tx_no = last_tx_no,
            "Hydrated transactions from store"
        );
        Ok(resumable)
    }

    /// Write a snapshot now, returning any failure.
    pub fn flush(&self) -> MonitorResult<()> {
        let state = self.lock();
        if !state.has_persistable() {
            return Ok(());
        }
        let blob = codec::encode(&state.records)?;
        self.store.set(&self.key, &blob)?;
        Ok(())
    }

    /// Snapshot after a mutation. Failures are logged and swallowed.
    fn snapshot(&self, state: &RegistryState) {
        if !state.has_persistable() {
            return;
        }
        let result = codec::encode(&state.records)
            .map_err(MonitorError::from)
            .and_then(|blob| self.store.set(&self.key, &blob).map_err(MonitorError::from));
        if let Err(e) = result {
            metrics::record_snapshot_failure();
            tracing::error!(key = %self.key, error = %e, "Failed to persist transactions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{TxCommon, TxMeta, TxState};
    use crate::persistence::store::{MemoryStore, StoreError};
    use alloy::primitives::TxHash;
    use chrono::Utc;

    fn record(tx_no: u64, account: Address, network: &str, state: TxState) -> TxRecord {
        let now = Utc::now();
        TxRecord {
            common: TxCommon {
                tx_no,
                account,
                network_id: network.to_string(),
                meta: TxMeta::new(),
                start: now,
                last_change: now,
                end: None,
                dismissed: false,
            },
            state,
        }
    }

    fn propagating(tx_no: u64) -> TxRecord {
        record(
            tx_no,
            Address::ZERO,
            "1",
            TxState::Propagating {
                tx_hash: TxHash::repeat_byte(tx_no as u8),
                broadcasted_at: Utc::now(),
            },
        )
    }

    fn registry() -> (MemoryStore, TransactionRegistry) {
        let store = MemoryStore::new();
        let registry = TransactionRegistry::new(Arc::new(store.clone()), "transactions");
        (store, registry)
    }

    #[test]
    fn test_upsert_inserts_then_replaces_in_place() {
        let (_, registry) = registry();
        registry.upsert(propagating(1));
        registry.upsert(propagating(2));

        let mut updated = propagating(1);
        updated.state = TxState::Error {
            tx_hash: TxHash::repeat_byte(1),
            error: "boom".into(),
        };
        assert!(registry.upsert(updated).is_some());

        let all = registry.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].tx_no(), 1);
        assert_eq!(all[0].status(), crate::monitor::TxStatus::Error);
        assert_eq!(all[1].tx_no(), 2);
    }

    #[test]
    fn test_regression_is_rejected() {
        let (_, registry) = registry();
        let mut done = propagating(1);
        done.state = TxState::Error {
            tx_hash: TxHash::repeat_byte(1),
            error: "boom".into(),
        };
        registry.upsert(done);
        assert!(registry.upsert(propagating(1)).is_none());
        assert_eq!(registry.get(1).unwrap().status(), crate::monitor::TxStatus::Error);
    }

    #[test]
    fn test_dismiss() {
        let (_, registry) = registry();
        registry.upsert(propagating(3));

        registry.dismiss(3).unwrap();
        registry.dismiss(3).unwrap();
        assert!(registry.get(3).unwrap().common.dismissed);

        assert!(matches!(registry.dismiss(99), Err(MonitorError::RecordNotFound(99))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dismissed_flag_survives_state_updates() {
        let (_, registry) = registry();
        registry.upsert(propagating(1));
        registry.dismiss(1).unwrap();

        let mut next = propagating(1);
        next.state = TxState::WaitingForConfirmation {
            tx_hash: TxHash::repeat_byte(1),
            broadcasted_at: Utc::now(),
        };
        registry.upsert(next);
        assert!(registry.get(1).unwrap().common.dismissed);
    }

    #[test]
    fn test_list_for_scopes_by_account_and_network() {
        let (_, registry) = registry();
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);
        registry.upsert(record(1, alice, "1", TxState::WaitingForApproval));
        registry.upsert(record(2, bob, "1", TxState::WaitingForApproval));
        registry.upsert(record(3, alice, "5", TxState::WaitingForApproval));
        registry.upsert(record(4, alice, "1", TxState::WaitingForApproval));

        let listed: Vec<u64> = registry.list_for(&alice, "1").iter().map(|r| r.tx_no()).collect();
        assert_eq!(listed, vec![1, 4]);
    }

    #[test]
    fn test_every_mutation_snapshots() {
        let (store, registry) = registry();
        registry.upsert(record(1, Address::ZERO, "1", TxState::WaitingForApproval));
        // Nothing persistable yet.
        assert_eq!(store.get("transactions").unwrap(), None);

        registry.upsert(propagating(2));
        let persisted = codec::decode(&store.get("transactions").unwrap().unwrap()).unwrap();
        assert_eq!(persisted.len(), 1);

        registry.dismiss(2).unwrap();
        let persisted = codec::decode(&store.get("transactions").unwrap().unwrap()).unwrap();
        assert!(persisted[0].common.dismissed);
    }

    #[test]
    fn test_hydrate_restores_counter_and_splits_pending() {
        let (store, first) = registry();
        first.upsert(propagating(7));
        let mut failed = propagating(41);
        failed.state = TxState::Error {
            tx_hash: TxHash::repeat_byte(41),
            error: "boom".into(),
        };
        first.upsert(failed);

        let second = TransactionRegistry::new(Arc::new(store), "transactions");
        let resumable = second.hydrate().unwrap();
        assert_eq!(resumable.len(), 1);
        assert_eq!(resumable[0].tx_no(), 7);
        assert_eq!(second.len(), 2);
        assert!(second.allocate_tx_no() > 41);
    }

    #[test]
    fn test_hydrate_empty_store() {
        let (_, registry) = registry();
        assert!(registry.hydrate().unwrap().is_empty());
        assert_eq!(registry.allocate_tx_no(), 1);
    }

    #[test]
    fn test_unpersistable_records_keep_existing_snapshot() {
        let (store, first) = registry();
        first.upsert(propagating(1));
        let blob = store.get("transactions").unwrap();

        let second = TransactionRegistry::new(Arc::new(store.clone()), "transactions");
        second.upsert(record(1, Address::ZERO, "1", TxState::WaitingForApproval));
        second.flush().unwrap();
        assert_eq!(store.get("transactions").unwrap(), blob);
    }

    #[test]
    fn test_hydrate_after_local_insert_keeps_both() {
        let (store, first) = registry();
        first.upsert(propagating(1));

        let second = TransactionRegistry::new(Arc::new(store.clone()), "transactions");
        let local = second.allocate_tx_no();
        second.upsert(propagating(local + 5));
        assert_eq!(second.hydrate().unwrap().len(), 1);
        assert!(second.allocate_tx_no() > local + 5);

        let persisted = codec::decode(&store.get("transactions").unwrap().unwrap()).unwrap();
        let numbers: Vec<u64> = persisted.iter().map(|r| r.tx_no()).collect();
        assert_eq!(numbers, vec![local + 5, 1]);
    }

    /// Counts writes on top of a shared in-memory store.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: std::sync::atomic::AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, blob: &str) -> Result<(), StoreError> {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.set(key, blob)
        }
    }

    #[test]
    fn test_hydrate_does_not_rewrite_store() {
        let (store, first) = registry();
        for tx_no in 1..=5 {
            first.upsert(propagating(tx_no));
        }

        let counting = Arc::new(CountingStore {
            inner: store,
            writes: Default::default(),
        });
        let second = TransactionRegistry::new(counting.clone(), "transactions");
        assert_eq!(second.hydrate().unwrap().len(), 5);
        assert_eq!(second.len(), 5);
        assert_eq!(counting.writes.load(std::sync::atomic::Ordering::SeqCst), 0);

        // Second call is a no-op.
        assert!(second.hydrate().unwrap().is_empty());
        assert_eq!(second.len(), 5);
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _blob: &str) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("disk full".into()))
        }
    }

    #[test]
    fn test_snapshot_failure_does_not_fail_mutation() {
        let registry = TransactionRegistry::new(Arc::new(BrokenStore), "transactions");
        assert!(registry.upsert(propagating(1)).is_some());
        assert!(registry.dismiss(1).is_ok());
        assert!(registry.flush().is_err());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let (_, registry) = registry();
        let mut changes = registry.subscribe();
        registry.upsert(propagating(1));
        registry.dismiss(1).unwrap();

        assert!(matches!(changes.recv().await.unwrap(), RegistryChange::Upserted(r) if r.tx_no() == 1));
        assert_eq!(changes.recv().await.unwrap(), RegistryChange::Dismissed(1));
    }
}
