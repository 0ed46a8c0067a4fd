//! Transaction record types.
//!
//! A record is a common envelope ([`TxCommon`]) plus a status-specific
//! payload ([`TxState`]). Only the fields that make sense for a status exist
//! on its variant.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    WaitingForApproval,
    CancelledByTheUser,
    Propagating,
    WaitingForConfirmation,
    Success,
    Error,
    Failure,
}

impl TxStatus {
    /// Position in the forward-only lifecycle. All terminal statuses share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            TxStatus::WaitingForApproval => 0,
            TxStatus::Propagating => 1,
            TxStatus::WaitingForConfirmation => 2,
            TxStatus::Success
            | TxStatus::Failure
            | TxStatus::Error
            | TxStatus::CancelledByTheUser => 3,
        }
    }

    /// No further status transition is expected.
    pub fn is_done(self) -> bool {
        self.rank() == 3
    }

    /// Whether `next` may replace `self` on the same record.
    ///
    /// Re-emitting the same status is allowed (confirmation updates on `Success`).
    pub fn can_advance_to(self, next: TxStatus) -> bool {
        self == next || next.rank() > self.rank()
    }

    /// Broadcast was observed and the transaction may still land.
    pub fn is_pending(self) -> bool {
        matches!(self, TxStatus::Propagating | TxStatus::WaitingForConfirmation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TxStatus::WaitingForApproval => "WaitingForApproval",
            TxStatus::CancelledByTheUser => "CancelledByTheUser",
            TxStatus::Propagating => "Propagating",
            TxStatus::WaitingForConfirmation => "WaitingForConfirmation",
            TxStatus::Success => "Success",
            TxStatus::Error => "Error",
            TxStatus::Failure => "Failure",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the transaction that landed relates to the one originally broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebroadcastStatus {
    /// Same nonce and call data, new hash.
    Speedup,
    /// Same nonce, different call data.
    Cancel,
    /// The explorer has no entry for the nonce.
    Lost,
}

impl RebroadcastStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RebroadcastStatus::Speedup => "speedup",
            RebroadcastStatus::Cancel => "cancel",
            RebroadcastStatus::Lost => "lost",
        }
    }
}

/// A single value of caller-supplied metadata.
#[derive(Debug, Clone)]
pub enum MetaValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Arbitrary-precision amount in base units.
    Amount(U256),
}

/// Floats compare equal when both are NaN, so a stored value always equals
/// itself after a round trip.
impl PartialEq for MetaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MetaValue::Text(a), MetaValue::Text(b)) => a == b,
            (MetaValue::Integer(a), MetaValue::Integer(b)) => a == b,
            (MetaValue::Float(a), MetaValue::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (MetaValue::Bool(a), MetaValue::Bool(b)) => a == b,
            (MetaValue::Amount(a), MetaValue::Amount(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Integer(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<U256> for MetaValue {
    fn from(value: U256) -> Self {
        MetaValue::Amount(value)
    }
}

/// Opaque description of what a transaction is meant to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxMeta(BTreeMap<String, MetaValue>);

impl TxMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    /// The conventional `kind` entry, when it is text.
    pub fn kind(&self) -> Option<&str> {
        match self.0.get("kind") {
            Some(MetaValue::Text(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, MetaValue)> for TxMeta {
    fn from_iter<I: IntoIterator<Item = (String, MetaValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Chain view of a transaction, as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionLike {
    pub hash: TxHash,
    pub nonce: u64,
    pub input: Bytes,
    pub block_hash: Option<B256>,
}

/// Chain view of a mined transaction's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLike {
    pub transaction_hash: TxHash,
    pub status: bool,
    pub block_number: u64,
    pub block_hash: Option<B256>,
    pub gas_used: u64,
    pub effective_gas_price: U256,
}

/// Fields shared by every status.
#[derive(Debug, Clone, PartialEq)]
pub struct TxCommon {
    /// Session-unique, strictly increasing identifier.
    pub tx_no: u64,
    pub account: Address,
    pub network_id: String,
    pub meta: TxMeta,
    pub start: DateTime<Utc>,
    pub last_change: DateTime<Utc>,
    /// Set once when the record reaches a terminal status.
    pub end: Option<DateTime<Utc>>,
    /// Display-only; never influences status transitions.
    pub dismissed: bool,
}

/// Status plus the fields that only exist for that status.
#[derive(Debug, Clone, PartialEq)]
pub enum TxState {
    WaitingForApproval,
    CancelledByTheUser {
        error: String,
    },
    Propagating {
        tx_hash: TxHash,
        broadcasted_at: DateTime<Utc>,
    },
    WaitingForConfirmation {
        tx_hash: TxHash,
        broadcasted_at: DateTime<Utc>,
    },
    Success {
        tx_hash: TxHash,
        block_number: u64,
        receipt: ReceiptLike,
        confirmations: u64,
        safe_confirmations: u64,
        rebroadcast: Option<RebroadcastStatus>,
    },
    Failure {
        tx_hash: TxHash,
        block_number: u64,
        receipt: ReceiptLike,
        rebroadcast: Option<RebroadcastStatus>,
    },
    Error {
        tx_hash: TxHash,
        error: String,
    },
}

impl TxState {
    pub fn status(&self) -> TxStatus {
        match self {
            TxState::WaitingForApproval => TxStatus::WaitingForApproval,
            TxState::CancelledByTheUser { .. } => TxStatus::CancelledByTheUser,
            TxState::Propagating { .. } => TxStatus::Propagating,
            TxState::WaitingForConfirmation { .. } => TxStatus::WaitingForConfirmation,
            TxState::Success { .. } => TxStatus::Success,
            TxState::Failure { .. } => TxStatus::Failure,
            TxState::Error { .. } => TxStatus::Error,
        }
    }

    /// Hash of the broadcast (or the replacement that landed), if one exists.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            TxState::WaitingForApproval | TxState::CancelledByTheUser { .. } => None,
            TxState::Propagating { tx_hash, .. }
            | TxState::WaitingForConfirmation { tx_hash, .. }
            | TxState::Success { tx_hash, .. }
            | TxState::Failure { tx_hash, .. }
            | TxState::Error { tx_hash, .. } => Some(*tx_hash),
        }
    }

    pub fn broadcasted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TxState::Propagating { broadcasted_at, .. }
            | TxState::WaitingForConfirmation { broadcasted_at, .. } => Some(*broadcasted_at),
            _ => None,
        }
    }
}

/// One tracked broadcast attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TxRecord {
    pub common: TxCommon,
    pub state: TxState,
}

impl TxRecord {
    pub fn status(&self) -> TxStatus {
        self.state.status()
    }

    pub fn tx_no(&self) -> u64 {
        self.common.tx_no
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        self.state.tx_hash()
    }

    /// No further status transition is expected. `Success` counts as done
    /// even before the safe confirmation depth is reached.
    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    pub fn is_done_but_not_successful(&self) -> bool {
        self.is_done() && !self.is_success()
    }

    pub fn is_success(&self) -> bool {
        self.status() == TxStatus::Success
    }

    /// Done and, for a success, buried under enough blocks to be irreversible.
    pub fn is_final(&self) -> bool {
        match &self.state {
            TxState::Success {
                confirmations,
                safe_confirmations,
                ..
            } => confirmations >= safe_confirmations,
            other => other.status().is_done(),
        }
    }

    pub fn belongs_to(&self, account: &Address, network_id: &str) -> bool {
        self.common.account == *account && self.common.network_id == network_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: TxState) -> TxRecord {
        let now = Utc::now();
        TxRecord {
            common: TxCommon {
                tx_no: 1,
                account: Address::ZERO,
                network_id: "1".to_string(),
                meta: TxMeta::new().with("kind", "deposit"),
                start: now,
                last_change: now,
                end: None,
                dismissed: false,
            },
            state,
        }
    }

    fn receipt() -> ReceiptLike {
        ReceiptLike {
            transaction_hash: TxHash::repeat_byte(1),
            status: true,
            block_number: 100,
            block_hash: None,
            gas_used: 21_000,
            effective_gas_price: U256::from(1_000_000_000u64),
        }
    }

    #[test]
    fn test_status_ordering() {
        use TxStatus::*;
        assert!(WaitingForApproval.can_advance_to(Propagating));
        assert!(WaitingForApproval.can_advance_to(CancelledByTheUser));
        assert!(Propagating.can_advance_to(WaitingForConfirmation));
        assert!(WaitingForConfirmation.can_advance_to(Error));
        assert!(Success.can_advance_to(Success));

        assert!(!WaitingForConfirmation.can_advance_to(Propagating));
        assert!(!Success.can_advance_to(Failure));
        assert!(!Failure.can_advance_to(WaitingForConfirmation));
    }

    #[test]
    fn test_done_states() {
        let done = [
            TxStatus::CancelledByTheUser,
            TxStatus::Error,
            TxStatus::Failure,
            TxStatus::Success,
        ];
        for status in done {
            assert!(status.is_done(), "{status} should be done");
        }
        assert!(!TxStatus::Propagating.is_done());
        assert!(!TxStatus::WaitingForApproval.is_done());
    }

    #[test]
    fn test_success_done_before_final() {
        let rec = record(TxState::Success {
            tx_hash: TxHash::repeat_byte(1),
            block_number: 100,
            receipt: receipt(),
            confirmations: 1,
            safe_confirmations: 3,
            rebroadcast: None,
        });
        assert!(rec.is_done());
        assert!(rec.is_success());
        assert!(!rec.is_final());
    }

    #[test]
    fn test_tx_hash_availability() {
        assert_eq!(record(TxState::WaitingForApproval).tx_hash(), None);
        let hash = TxHash::repeat_byte(7);
        let rec = record(TxState::Error {
            tx_hash: hash,
            error: "boom".into(),
        });
        assert_eq!(rec.tx_hash(), Some(hash));
        assert!(rec.is_done_but_not_successful());
    }

    #[test]
    fn test_meta_kind() {
        let meta = TxMeta::new()
            .with("kind", "deposit")
            .with("amount", U256::from(5u64));
        assert_eq!(meta.kind(), Some("deposit"));
        assert_eq!(meta.get("amount"), Some(&MetaValue::Amount(U256::from(5u64))));
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn test_meta_floats_equal_themselves() {
        assert_eq!(MetaValue::from(f64::NAN), MetaValue::from(f64::NAN));
        assert_eq!(MetaValue::from(f64::INFINITY), MetaValue::from(f64::INFINITY));
        assert_ne!(MetaValue::from(f64::NAN), MetaValue::from(1.0));
        assert_ne!(MetaValue::from(1i64), MetaValue::from(1.0));
        let meta = TxMeta::new().with("ratio", f64::NAN);
        assert_eq!(meta, meta.clone());
    }
}
