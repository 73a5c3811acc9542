//! Node, indexer and collector seams
//!
//! The core talks to the chain only through [`NodeRpc`] and
//! [`CellCollector`]. [`CkbRpcClient`] implements both over JSON-RPC; tests
//! use in-memory doubles.

pub mod client;
pub mod errors;
pub mod json;
pub mod retry;

pub use client::CkbRpcClient;
pub use errors::RpcError;
pub use retry::{retry_with_backoff, RetryConfig};

use async_trait::async_trait;
use ckb_types::H256;
use serde::{Deserialize, Serialize};

use crate::types::{LiveCell, OutPoint, Script};
use crate::wallet::SignedTransaction;

/// Pool and chain status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Proposed,
    Committed,
    Rejected(Option<String>),
    Unknown,
}

impl TxStatus {
    /// Committed or rejected; polling stops on either
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Committed | TxStatus::Rejected(_))
    }
}

#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Submit a signed transaction, returning its hash once the pool accepts it
    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<H256, RpcError>;

    async fn get_transaction_status(&self, tx_hash: &H256) -> Result<TxStatus, RpcError>;

    /// The live cell at `out_point`, or `None` when spent or unknown
    async fn get_live_cell(&self, out_point: &OutPoint) -> Result<Option<LiveCell>, RpcError>;
}

#[async_trait]
pub trait CellCollector: Send + Sync {
    /// Live cells locked by `lock` that carry no type script
    async fn list_spendable(&self, lock: &Script) -> Result<Vec<LiveCell>, RpcError>;

    /// First live cell with exactly `type_script`
    async fn find_type_cell(&self, type_script: &Script) -> Result<Option<LiveCell>, RpcError>;
}
