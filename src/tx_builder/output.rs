//! Results handed back to callers once a transaction is submitted

use ckb_types::H256;
use serde::{Deserialize, Serialize};

use crate::codec::h256_hex;
use crate::tx_builder::record::BuildMode;
use crate::tx_builder::skeleton::TransactionSkeleton;

/// A record transaction accepted by the node
///
/// Resolves on submission, not on commitment; callers that need the
/// transaction on chain poll with
/// [`ConfirmationPoller`](crate::workflow::confirm::ConfirmationPoller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSubmission {
    pub tx_hash: H256,
    /// The exact skeleton that was signed, placeholder witnesses included
    pub skeleton: TransactionSkeleton,
    /// Type id of the newly created record; `None` for transfers
    pub spore_id: Option<H256>,
    pub mode: Option<BuildMode>,
    pub fee: u64,
}

impl RecordSubmission {
    pub fn tx_hash_hex(&self) -> String {
        h256_hex(&self.tx_hash)
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "tx {} ({} inputs, {} outputs, fee {})",
            self.tx_hash_hex(),
            self.skeleton.inputs.len(),
            self.skeleton.outputs.len(),
            self.fee
        )
    }
}
