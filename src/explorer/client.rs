//! Etherscan-compatible account history client.

use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ExplorerConfig;
use crate::explorer::ExplorerError;
use crate::monitor::ports::{ExternalTx, ExternalTxSource};

/// Raw `txlist` response envelope.
#[derive(Debug, Deserialize)]
struct TxListResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TxListEntry {
    hash: String,
    nonce: String,
    input: String,
}

/// Client for the `account/txlist` endpoint.
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    http: reqwest::Client,
    config: ExplorerConfig,
}

impl EtherscanClient {
    pub fn new(config: ExplorerConfig) -> Result<Self, ExplorerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExplorerError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Fetch the account's transactions from `since_block`, newest first.
    pub async fn txlist(
        &self,
        account: Address,
        since_block: u64,
    ) -> Result<Vec<ExternalTx>, ExplorerError> {
        let response = self
            .http
            .get(&self.config.api_url)
            .query(&[
                ("module", "account".to_string()),
                ("action", "txlist".to_string()),
                ("address", account.to_string()),
                ("startblock", since_block.to_string()),
                ("sort", "desc".to_string()),
                ("apikey", self.config.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| ExplorerError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExplorerError::Http(e.to_string()))?;

        let body: TxListResponse = response
            .json()
            .await
            .map_err(|e| ExplorerError::Malformed(e.to_string()))?;

        parse_txlist(body)
    }
}

fn parse_txlist(body: TxListResponse) -> Result<Vec<ExternalTx>, ExplorerError> {
    let entries = match body.result {
        serde_json::Value::Array(_) => {
            serde_json::from_value::<Vec<TxListEntry>>(body.result)
                .map_err(|e| ExplorerError::Malformed(e.to_string()))?
        }
        // Errors come back as status "0" with a string result.
        other => {
            let detail = other.as_str().unwrap_or(&body.message).to_string();
            return Err(ExplorerError::Api {
                status: body.status,
                detail,
            });
        }
    };

    entries
        .into_iter()
        .map(|entry| {
            Ok(ExternalTx {
                nonce: entry
                    .nonce
                    .parse()
                    .map_err(|_| ExplorerError::Malformed(format!("nonce {:?}", entry.nonce)))?,
                hash: entry
                    .hash
                    .parse::<TxHash>()
                    .map_err(|e| ExplorerError::Malformed(format!("hash {}: {}", entry.hash, e)))?,
                call_data: entry
                    .input
                    .parse::<Bytes>()
                    .map_err(|e| ExplorerError::Malformed(format!("input: {}", e)))?,
            })
        })
        .collect()
}

#[async_trait]
impl ExternalTxSource for EtherscanClient {
    async fn transactions_for_account(
        &self,
        account: Address,
        since_block: u64,
    ) -> Result<Vec<ExternalTx>, ExplorerError> {
        self.txlist(account, since_block).await
    }
}

/// Used when no explorer is configured. Rebroadcasts go undetected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledExplorer;

#[async_trait]
impl ExternalTxSource for DisabledExplorer {
    async fn transactions_for_account(
        &self,
        _account: Address,
        _since_block: u64,
    ) -> Result<Vec<ExternalTx>, ExplorerError> {
        Ok(Vec::new())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
