//! JSON-RPC client for a CKB node and its indexer

use async_trait::async_trait;
use ckb_types::H256;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::json::{
    IndexerPage, JsonCellWithStatus, JsonTransaction, JsonTransactionWithStatus, JsonU64,
    SearchFilter, SearchKey,
};
use super::{retry_with_backoff, CellCollector, NodeRpc, RetryConfig, RpcError, TxStatus};
use crate::config::RpcConfig;
use crate::types::{LiveCell, OutPoint, Script};
use crate::wallet::SignedTransaction;

/// Cells per indexer page
const PAGE_LIMIT: u64 = 100;

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

pub struct CkbRpcClient {
    http: reqwest::Client,
    node_url: String,
    indexer_url: String,
    timeout_ms: u64,
    retry: RetryConfig,
    next_id: AtomicU64,
}

impl CkbRpcClient {
    pub fn new(config: &RpcConfig) -> Result<Self, RpcError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                endpoint: config.node_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            node_url: config.node_url.clone(),
            indexer_url: config.indexer_url().to_string(),
            timeout_ms: timeout.as_millis() as u64,
            retry: RetryConfig {
                max_attempts: config.max_retries.max(1),
                ..RetryConfig::default()
            },
            next_id: AtomicU64::new(1),
        })
    }

    /// One JSON-RPC round trip; `Ok(Value::Null)` for a null result
    async fn call(&self, url: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "id": id,
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        debug!(method, id, endpoint = url, "RPC request");

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest(e, url, self.timeout_ms))?;
        let envelope: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::from_reqwest(e, url, self.timeout_ms))?;

        if let Some(error) = envelope.error {
            let message = match error.data {
                Some(data) => format!("{} ({data})", error.message),
                None => error.message,
            };
            return Err(RpcError::RpcResponse {
                endpoint: url.to_string(),
                message,
                code: error.code,
            });
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let value = retry_with_backoff(method, &self.retry, || self.call(url, method, params.clone())).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }

    /// Every indexer cell matching `search_key`, following cursors
    async fn get_all_cells(&self, search_key: &SearchKey) -> Result<Vec<LiveCell>, RpcError> {
        let mut cells = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = json!([search_key, "asc", JsonU64(PAGE_LIMIT), cursor]);
            let page: IndexerPage = self.call_typed(&self.indexer_url, "get_cells", params).await?;
            let count = page.objects.len();
            for object in page.objects {
                cells.push(object.into_live_cell().map_err(RpcError::Decode)?);
            }
            if (count as u64) < PAGE_LIMIT {
                break;
            }
            cursor = Some(page.last_cursor);
        }
        Ok(cells)
    }
}

#[async_trait]
impl NodeRpc for CkbRpcClient {
    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<H256, RpcError> {
        let payload = JsonTransaction::from(&tx.transaction);
        let params = json!([payload, "passthrough"]);
        // Submissions are never retried
        match self.call(&self.node_url, "send_transaction", params).await {
            Ok(value) => serde_json::from_value(value)
                .map_err(|e| RpcError::Decode(format!("send_transaction: {e}"))),
            Err(RpcError::RpcResponse { message, code, .. }) => {
                warn!(code, error = %message, "Node rejected transaction");
                Err(RpcError::Rejected { message, code })
            }
            Err(e) => Err(e),
        }
    }

    async fn get_transaction_status(&self, tx_hash: &H256) -> Result<TxStatus, RpcError> {
        let value: Option<JsonTransactionWithStatus> = self
            .call_typed(&self.node_url, "get_transaction", json!([tx_hash]))
            .await?;
        let Some(result) = value else {
            return Ok(TxStatus::Unknown);
        };
        Ok(match result.tx_status.status.as_str() {
            "pending" => TxStatus::Pending,
            "proposed" => TxStatus::Proposed,
            "committed" => TxStatus::Committed,
            "rejected" => TxStatus::Rejected(result.tx_status.reason),
            _ => TxStatus::Unknown,
        })
    }

    async fn get_live_cell(&self, out_point: &OutPoint) -> Result<Option<LiveCell>, RpcError> {
        let params = json!([super::json::JsonOutPoint::from(out_point), true]);
        let result: JsonCellWithStatus = self.call_typed(&self.node_url, "get_live_cell", params).await?;
        if result.status != "live" {
            debug!(%out_point, status = %result.status, "Cell is not live");
            return Ok(None);
        }
        let Some(cell) = result.cell else {
            return Ok(None);
        };
        Ok(Some(LiveCell {
            out_point: out_point.clone(),
            output: cell.output.into(),
            data: cell.data.map(|d| d.content.0).unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl CellCollector for CkbRpcClient {
    async fn list_spendable(&self, lock: &Script) -> Result<Vec<LiveCell>, RpcError> {
        let search_key = SearchKey {
            script: lock.clone(),
            script_type: "lock",
            filter: Some(SearchFilter {
                script_len_range: [JsonU64(0), JsonU64(1)],
            }),
            with_data: true,
        };
        let cells = self.get_all_cells(&search_key).await?;
        Ok(cells.into_iter().filter(|cell| cell.output.is_plain()).collect())
    }

    async fn find_type_cell(&self, type_script: &Script) -> Result<Option<LiveCell>, RpcError> {
        let search_key = SearchKey {
            script: type_script.clone(),
            script_type: "type",
            filter: None,
            with_data: true,
        };
        let params = json!([search_key, "asc", JsonU64(1), Value::Null]);
        let page: IndexerPage = self.call_typed(&self.indexer_url, "get_cells", params).await?;
        page.objects
            .into_iter()
            .next()
            .map(|cell| cell.into_live_cell().map_err(RpcError::Decode))
            .transpose()
    }
}
