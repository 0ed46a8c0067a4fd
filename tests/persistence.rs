//! Restart behaviour: snapshots written by one monitor are picked up by the next.

use std::sync::Arc;
use std::time::Duration;

use txmon::monitor::{BroadcastError, TxMeta, TxState, TxStatus};
use txmon::persistence::{decode, FileStore, KeyValueStore, MemoryStore};

mod common;
use common::{
    account, fast_settings, hash, monitor, receipt, seen, transaction, within, MockChain,
    MockExplorer,
};

#[tokio::test]
async fn test_pending_watch_resumes_after_restart() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    // First session: broadcast, never becomes visible, gives up quickly.
    let mut short = fast_settings();
    short.poll_ceiling = Duration::from_millis(100);
    let (first, _first_blocks) = monitor(MockChain::new(), MockExplorer::new(), store.clone(), short);
    let meta = TxMeta::new().with("kind", "approve").with("amount", 1.5);
    let mut handle = first.watch_and_send(account(), "1", meta.clone(), async { Ok(hash(0xc1)) });
    while within(handle.changed()).await.is_some() {}
    let before = handle.current();
    assert_eq!(before.status(), TxStatus::Propagating);

    // Second session: the node now has it mined.
    let chain = MockChain::new();
    let tx = transaction(hash(0xc1), 12, b"\x09");
    chain.add_transaction(tx.clone());
    chain.add_receipt(receipt(tx.hash, 300, true));
    let (second, blocks) = monitor(
        chain,
        MockExplorer::with_history(vec![seen(&tx)]),
        store.clone(),
        fast_settings(),
    );
    blocks.publish(300);

    let mut resumed = second.restore();
    assert_eq!(resumed.len(), 1);
    let handle = &mut resumed[0];
    assert_eq!(handle.tx_no(), before.tx_no());
    assert_eq!(handle.current().status(), TxStatus::Propagating);

    let done = within(handle.wait_until_done()).await.unwrap();
    assert_eq!(done.status(), TxStatus::Success);
    assert_eq!(done.common.start, before.common.start);
    assert_eq!(done.common.meta, meta);

    // New numbers continue past everything restored.
    let next = second.watch_and_send(account(), "1", TxMeta::new(), async {
        Err(BroadcastError::UserRejected("no".to_string()))
    });
    assert!(next.tx_no() > before.tx_no());
}

#[tokio::test]
async fn test_submit_before_restore_keeps_persisted_watch() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let mut short = fast_settings();
    short.poll_ceiling = Duration::from_millis(100);
    let (first, _first_blocks) = monitor(MockChain::new(), MockExplorer::new(), store.clone(), short);
    let mut handle = first.watch_and_send(account(), "1", TxMeta::new(), async { Ok(hash(0xc2)) });
    while within(handle.changed()).await.is_some() {}
    let persisted = handle.current();
    assert_eq!(persisted.status(), TxStatus::Propagating);

    // Next session submits while the wallet prompt is still open, then restores.
    let (second, _blocks) = monitor(MockChain::new(), MockExplorer::new(), store.clone(), fast_settings());
    let waiting = second.watch_and_send(account(), "1", TxMeta::new(), std::future::pending());
    assert!(waiting.tx_no() > persisted.tx_no());
    assert_eq!(waiting.current().status(), TxStatus::WaitingForApproval);

    let stored = decode(&store.get("transactions").unwrap().unwrap()).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].tx_no(), persisted.tx_no());
    assert_eq!(stored[0].status(), TxStatus::Propagating);

    let resumed = second.restore();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].tx_no(), persisted.tx_no());
    assert!(second.restore().is_empty());

    let listed: Vec<u64> = second
        .list_transactions(&account(), "1")
        .iter()
        .map(|r| r.tx_no())
        .collect();
    assert_eq!(listed, vec![persisted.tx_no(), waiting.tx_no()]);
}

#[tokio::test]
async fn test_terminal_records_load_without_a_watch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let chain = MockChain::new();
    let tx = transaction(hash(0xd1), 1, b"");
    chain.add_transaction(tx.clone());
    chain.add_receipt(receipt(tx.hash, 500, false));
    let explorer = MockExplorer::with_history(vec![seen(&tx)]);

    let failed = {
        let (first, blocks) = monitor(
            chain.clone(),
            explorer.clone(),
            Arc::new(FileStore::new(&path)),
            fast_settings(),
        );
        blocks.publish(500);

        let mut handle = first.watch_and_send(account(), "1", TxMeta::new(), async { Ok(hash(0xd1)) });
        let failed = within(handle.wait_until_done()).await.unwrap();

        // Never persisted.
        let mut rejected = first.watch_and_send(account(), "1", TxMeta::new(), async {
            Err(BroadcastError::UserRejected("no".to_string()))
        });
        within(rejected.wait_until_done()).await.unwrap();

        first.shutdown().unwrap();
        failed
    };
    assert!(path.exists());

    let receipt_calls = chain.receipt_calls();
    let (second, _blocks) = monitor(
        chain.clone(),
        explorer,
        Arc::new(FileStore::new(&path)),
        fast_settings(),
    );
    assert!(second.restore().is_empty());

    let listed = second.list_transactions(&account(), "1");
    assert_eq!(listed, vec![failed.clone()]);
    assert!(matches!(listed[0].state, TxState::Failure { block_number: 500, .. }));

    // Loaded records are not polled again.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(chain.receipt_calls(), receipt_calls);

    let next = second.watch_and_send(account(), "1", TxMeta::new(), async {
        Err(BroadcastError::Wallet("offline".to_string()))
    });
    assert!(next.tx_no() > failed.tx_no());
}

#[tokio::test]
async fn test_dismissed_flag_survives_restart() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let chain = MockChain::new();
    let tx = transaction(hash(0xe1), 2, b"\x01");
    chain.add_transaction(tx.clone());
    chain.add_receipt(receipt(tx.hash, 10, true));

    let (first, blocks) = monitor(
        chain.clone(),
        MockExplorer::with_history(vec![seen(&tx)]),
        store.clone(),
        fast_settings(),
    );
    blocks.publish(12);
    let mut handle = first.watch_and_send(account(), "1", TxMeta::new(), async { Ok(hash(0xe1)) });
    within(handle.wait_for(|r| r.is_final())).await.unwrap();
    first.dismiss(handle.tx_no()).unwrap();

    let (second, _blocks) = monitor(chain, MockExplorer::new(), store, fast_settings());
    second.restore();
    let restored = second.registry().get(handle.tx_no()).unwrap();
    assert!(restored.common.dismissed);
    assert!(restored.is_final());
}

#[tokio::test]
async fn test_empty_session_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (monitor, _blocks) = monitor(
        MockChain::new(),
        MockExplorer::new(),
        store.clone(),
        fast_settings(),
    );

    assert!(monitor.restore().is_empty());
    monitor.shutdown().unwrap();
    assert_eq!(store.get("transactions").unwrap(), None);
}
