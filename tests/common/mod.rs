//! Shared scripted collaborators for the integration tests.
#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use txmon::blockchain::{BlockchainError, BlockchainResult};
use txmon::explorer::ExplorerError;
use txmon::monitor::{
    block_channel, BlockPublisher, ChainReader, ExternalTx, ExternalTxSource, MonitorSettings,
    ReceiptLike, TransactionLike, TxMonitor,
};
use txmon::persistence::KeyValueStore;

/// Chain whose transactions and receipts are scripted by the test.
#[derive(Default)]
pub struct MockChain {
    block: AtomicU64,
    transactions: Mutex<HashMap<TxHash, TransactionLike>>,
    receipts: Mutex<HashMap<TxHash, ReceiptLike>>,
    failing: AtomicBool,
    receipt_calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_transaction(&self, transaction: TransactionLike) {
        self.transactions
            .lock()
            .unwrap()
            .insert(transaction.hash, transaction);
    }

    pub fn add_receipt(&self, receipt: ReceiptLike) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, receipt);
    }

    pub fn set_block(&self, block: u64) {
        self.block.store(block, Ordering::SeqCst);
    }

    /// Make every call fail with an RPC error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> BlockchainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BlockchainError::Rpc("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn block_number(&self) -> BlockchainResult<u64> {
        self.check()?;
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn transaction(&self, hash: TxHash) -> BlockchainResult<Option<TransactionLike>> {
        self.check()?;
        Ok(self.transactions.lock().unwrap().get(&hash).cloned())
    }

    async fn receipt(&self, hash: TxHash) -> BlockchainResult<Option<ReceiptLike>> {
        self.check()?;
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }
}

/// Explorer history scripted by the test.
#[derive(Default)]
pub struct MockExplorer {
    history: Mutex<Vec<ExternalTx>>,
    failing: AtomicBool,
}

impl MockExplorer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_history(history: Vec<ExternalTx>) -> Arc<Self> {
        let explorer = Self::default();
        *explorer.history.lock().unwrap() = history;
        Arc::new(explorer)
    }

    pub fn push(&self, tx: ExternalTx) {
        self.history.lock().unwrap().push(tx);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExternalTxSource for MockExplorer {
    async fn transactions_for_account(
        &self,
        _account: Address,
        _since_block: u64,
    ) -> Result<Vec<ExternalTx>, ExplorerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExplorerError::Http("503 Service Unavailable".to_string()));
        }
        Ok(self.history.lock().unwrap().clone())
    }
}

pub fn account() -> Address {
    Address::repeat_byte(0x11)
}

pub fn hash(byte: u8) -> TxHash {
    TxHash::repeat_byte(byte)
}

pub fn transaction(hash: TxHash, nonce: u64, input: &'static [u8]) -> TransactionLike {
    TransactionLike {
        hash,
        nonce,
        input: Bytes::from_static(input),
        block_hash: None,
    }
}

pub fn receipt(hash: TxHash, block_number: u64, status: bool) -> ReceiptLike {
    ReceiptLike {
        transaction_hash: hash,
        status,
        block_number,
        block_hash: None,
        gas_used: 21_000,
        effective_gas_price: U256::from(1_000_000_000u64),
    }
}

/// History entry that matches `transaction` exactly.
pub fn seen(transaction: &TransactionLike) -> ExternalTx {
    ExternalTx {
        nonce: transaction.nonce,
        hash: transaction.hash,
        call_data: transaction.input.clone(),
    }
}

pub fn fast_settings() -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_millis(10),
        poll_ceiling: Duration::from_secs(5),
        safe_confirmations: 2,
    }
}

/// Monitor wired to scripted collaborators, with a block publisher the test drives.
pub fn monitor(
    chain: Arc<MockChain>,
    explorer: Arc<MockExplorer>,
    store: Arc<dyn KeyValueStore>,
    settings: MonitorSettings,
) -> (TxMonitor, BlockPublisher) {
    let (publisher, blocks) = block_channel();
    let monitor = TxMonitor::new(chain, explorer, store, "transactions", blocks, settings);
    (monitor, publisher)
}

/// Fail the test instead of hanging.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
