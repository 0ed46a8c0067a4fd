//! Persistence codec for transaction records.
//!
//! Values whose JSON rendering would lose information are written as tagged
//! objects, `{"_type": "Date" | "BigNumber" | "Float", "_data": "..."}`, and
//! revived from the tag, so a decoded record equals the encoded one field
//! for field. Records that are waiting for approval or were cancelled by the
//! user have no meaning after a restart and are never written.

use alloy::primitives::{Address, TxHash, B256, U256};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::monitor::types::{
    MetaValue, RebroadcastStatus, ReceiptLike, TxCommon, TxMeta, TxRecord, TxState,
};

/// Errors raised while decoding a snapshot.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a tagged {expected}, found {found}")]
    UnexpectedTag {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid date {0:?}")]
    InvalidDate(String),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),
}

/// A precise value and its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", content = "_data")]
enum Tagged {
    Date(String),
    BigNumber(String),
    Float(String),
}

impl Tagged {
    fn kind(&self) -> &'static str {
        match self {
            Tagged::Date(_) => "Date",
            Tagged::BigNumber(_) => "BigNumber",
            Tagged::Float(_) => "Float",
        }
    }

    fn date(value: &DateTime<Utc>) -> Self {
        Tagged::Date(value.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    fn big(value: &U256) -> Self {
        Tagged::BigNumber(value.to_string())
    }

    fn into_date(self) -> Result<DateTime<Utc>, CodecError> {
        match self {
            Tagged::Date(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|_| CodecError::InvalidDate(raw)),
            other => Err(CodecError::UnexpectedTag {
                expected: "Date",
                found: other.kind(),
            }),
        }
    }

    fn into_big(self) -> Result<U256, CodecError> {
        match self {
            Tagged::BigNumber(raw) => {
                U256::from_str_radix(&raw, 10).map_err(|_| CodecError::InvalidNumber(raw))
            }
            other => Err(CodecError::UnexpectedTag {
                expected: "BigNumber",
                found: other.kind(),
            }),
        }
    }
}

/// Metadata value on the wire. Tagged objects are tried first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Tagged(Tagged),
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl From<&MetaValue> for StoredValue {
    fn from(value: &MetaValue) -> Self {
        match value {
            MetaValue::Text(s) => StoredValue::Text(s.clone()),
            MetaValue::Integer(i) => StoredValue::Integer(*i),
            MetaValue::Float(f) => StoredValue::Tagged(Tagged::Float(f.to_string())),
            MetaValue::Bool(b) => StoredValue::Bool(*b),
            MetaValue::Amount(a) => StoredValue::Tagged(Tagged::big(a)),
        }
    }
}

impl TryFrom<StoredValue> for MetaValue {
    type Error = CodecError;

    fn try_from(value: StoredValue) -> Result<Self, Self::Error> {
        Ok(match value {
            StoredValue::Text(s) => MetaValue::Text(s),
            StoredValue::Integer(i) => MetaValue::Integer(i),
            StoredValue::Bool(b) => MetaValue::Bool(b),
            StoredValue::Tagged(Tagged::Float(raw)) => MetaValue::Float(
                raw.parse()
                    .map_err(|_| CodecError::InvalidNumber(raw.clone()))?,
            ),
            StoredValue::Tagged(tagged @ Tagged::BigNumber(_)) => {
                MetaValue::Amount(tagged.into_big()?)
            }
            StoredValue::Tagged(Tagged::Date(raw)) => MetaValue::Text(raw),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredReceipt {
    transaction_hash: TxHash,
    status: bool,
    block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    block_hash: Option<B256>,
    gas_used: u64,
    effective_gas_price: Tagged,
}

impl From<&ReceiptLike> for StoredReceipt {
    fn from(receipt: &ReceiptLike) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            status: receipt.status,
            block_number: receipt.block_number,
            block_hash: receipt.block_hash,
            gas_used: receipt.gas_used,
            effective_gas_price: Tagged::big(&receipt.effective_gas_price),
        }
    }
}

impl TryFrom<StoredReceipt> for ReceiptLike {
    type Error = CodecError;

    fn try_from(stored: StoredReceipt) -> Result<Self, Self::Error> {
        Ok(Self {
            transaction_hash: stored.transaction_hash,
            status: stored.status,
            block_number: stored.block_number,
            block_hash: stored.block_hash,
            gas_used: stored.gas_used,
            effective_gas_price: stored.effective_gas_price.into_big()?,
        })
    }
}

/// Only the statuses that survive a restart have a wire form.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all_fields = "camelCase")]
enum StoredState {
    Propagating {
        tx_hash: TxHash,
        broadcasted_at: Tagged,
    },
    WaitingForConfirmation {
        tx_hash: TxHash,
        broadcasted_at: Tagged,
    },
    Success {
        tx_hash: TxHash,
        block_number: u64,
        receipt: StoredReceipt,
        confirmations: u64,
        safe_confirmations: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rebroadcast: Option<RebroadcastStatus>,
    },
    Failure {
        tx_hash: TxHash,
        block_number: u64,
        receipt: StoredReceipt,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rebroadcast: Option<RebroadcastStatus>,
    },
    Error {
        tx_hash: TxHash,
        error: String,
    },
}

impl StoredState {
    fn from_state(state: &TxState) -> Option<Self> {
        Some(match state {
            TxState::WaitingForApproval | TxState::CancelledByTheUser { .. } => return None,
            TxState::Propagating {
                tx_hash,
                broadcasted_at,
            } => StoredState::Propagating {
                tx_hash: *tx_hash,
                broadcasted_at: Tagged::date(broadcasted_at),
            },
            TxState::WaitingForConfirmation {
                tx_hash,
                broadcasted_at,
            } => StoredState::WaitingForConfirmation {
                tx_hash: *tx_hash,
                broadcasted_at: Tagged::date(broadcasted_at),
            },
            TxState::Success {
                tx_hash,
                block_number,
                receipt,
                confirmations,
                safe_confirmations,
                rebroadcast,
            } => StoredState::Success {
                tx_hash: *tx_hash,
                block_number: *block_number,
                receipt: receipt.into(),
                confirmations: *confirmations,
                safe_confirmations: *safe_confirmations,
                rebroadcast: *rebroadcast,
            },
            TxState::Failure {
                tx_hash,
                block_number,
                receipt,
                rebroadcast,
            } => StoredState::Failure {
                tx_hash: *tx_hash,
                block_number: *block_number,
                receipt: receipt.into(),
                rebroadcast: *rebroadcast,
            },
            TxState::Error { tx_hash, error } => StoredState::Error {
                tx_hash: *tx_hash,
                error: error.clone(),
            },
        })
    }

    fn into_state(self) -> Result<TxState, CodecError> {
        Ok(match self {
            StoredState::Propagating {
                tx_hash,
                broadcasted_at,
            } => TxState::Propagating {
                tx_hash,
                broadcasted_at: broadcasted_at.into_date()?,
            },
            StoredState::WaitingForConfirmation {
                tx_hash,
                broadcasted_at,
            } => TxState::WaitingForConfirmation {
                tx_hash,
                broadcasted_at: broadcasted_at.into_date()?,
            },
            StoredState::Success {
                tx_hash,
                block_number,
                receipt,
                confirmations,
                safe_confirmations,
                rebroadcast,
            } => TxState::Success {
                tx_hash,
                block_number,
                receipt: receipt.try_into()?,
                confirmations,
                safe_confirmations,
                rebroadcast,
            },
            StoredState::Failure {
                tx_hash,
                block_number,
                receipt,
                rebroadcast,
            } => TxState::Failure {
                tx_hash,
                block_number,
                receipt: receipt.try_into()?,
                rebroadcast,
            },
            StoredState::Error { tx_hash, error } => TxState::Error { tx_hash, error },
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    tx_no: u64,
    account: Address,
    network_id: String,
    meta: BTreeMap<String, StoredValue>,
    start: Tagged,
    last_change: Tagged,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<Tagged>,
    dismissed: bool,
    #[serde(flatten)]
    state: StoredState,
}

impl StoredRecord {
    fn from_record(record: &TxRecord) -> Option<Self> {
        let common = &record.common;
        Some(Self {
            state: StoredState::from_state(&record.state)?,
            tx_no: common.tx_no,
            account: common.account,
            network_id: common.network_id.clone(),
            meta: common
                .meta
                .iter()
                .map(|(k, v)| (k.clone(), StoredValue::from(v)))
                .collect(),
            start: Tagged::date(&common.start),
            last_change: Tagged::date(&common.last_change),
            end: common.end.as_ref().map(Tagged::date),
            dismissed: common.dismissed,
        })
    }

    fn into_record(self) -> Result<TxRecord, CodecError> {
        let meta = self
            .meta
            .into_iter()
            .map(|(k, v)| Ok((k, MetaValue::try_from(v)?)))
            .collect::<Result<TxMeta, CodecError>>()?;

        Ok(TxRecord {
            common: TxCommon {
                tx_no: self.tx_no,
                account: self.account,
                network_id: self.network_id,
                meta,
                start: self.start.into_date()?,
                last_change: self.last_change.into_date()?,
                end: self.end.map(Tagged::into_date).transpose()?,
                dismissed: self.dismissed,
            },
            state: self.state.into_state()?,
        })
    }
}

/// Whether a record is written by [`encode`].
pub fn is_persistable(record: &TxRecord) -> bool {
    !matches!(
        record.state,
        TxState::WaitingForApproval | TxState::CancelledByTheUser { .. }
    )
}

/// Serialize the records that survive a restart.
pub fn encode(records: &[TxRecord]) -> Result<String, CodecError> {
    let stored: Vec<StoredRecord> = records.iter().filter_map(StoredRecord::from_record).collect();
    Ok(serde_json::to_string(&stored)?)
}

/// Inverse of [`encode`].
pub fn decode(blob: &str) -> Result<Vec<TxRecord>, CodecError> {
    let stored: Vec<StoredRecord> = serde_json::from_str(blob)?;
    stored.into_iter().map(StoredRecord::into_record).collect()
}
