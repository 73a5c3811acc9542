//! In-memory chain and signer doubles
//!
//! [`MockChain`] implements both [`NodeRpc`] and [`CellCollector`] over a
//! list of live cells. Accepted transactions are applied immediately: their
//! inputs stop being live and their outputs become live, so a later build in
//! the same test sees the new cells. [`MockSigner`] fills placeholder
//! witnesses without any key material.
//!
//! Only compiled for tests or with the `test_utils` feature.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use ckb_types::H256;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::address::{encode_full_address, Network, SECP256K1_BLAKE160_CODE_HASH};
use crate::errors::{ForgeError, ForgeResult};
use crate::rpc::{CellCollector, NodeRpc, RpcError, TxStatus};
use crate::tx_builder::skeleton::TransactionSkeleton;
use crate::types::{CellOutput, LiveCell, OutPoint, Script, ScriptHashType};
use crate::wallet::{apply_witnesses, SignedTransaction, TxSigner};

/// Secp256k1 lock with args filled with `seed`
pub fn secp_lock(seed: u8) -> Script {
    Script::new(H256(SECP256K1_BLAKE160_CODE_HASH), ScriptHashType::Type, vec![seed; 20])
}

/// Testnet full address of [`secp_lock`]`(seed)`
pub fn testnet_address(seed: u8) -> String {
    encode_full_address(&secp_lock(seed), Network::Testnet)
        .expect("secp lock always encodes")
}

/// Plain cell of `capacity` shannons at a synthetic out point
pub fn plain_cell(lock: &Script, tx_byte: u8, index: u32, capacity: u64) -> LiveCell {
    LiveCell {
        out_point: OutPoint::new(H256([tx_byte; 32]), index),
        output: CellOutput::new(capacity, lock.clone(), None),
        data: Vec::new(),
    }
}

#[derive(Default)]
struct ChainState {
    live: Vec<LiveCell>,
    submitted: Vec<SignedTransaction>,
    statuses: HashMap<H256, TxStatus>,
    reject_next: Option<String>,
    fail_status_reads: usize,
    hold_commits: bool,
}

/// Node, indexer and collector backed by a vector of live cells
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cells(cells: Vec<LiveCell>) -> Self {
        let chain = Self::new();
        chain.state.lock().live = cells;
        chain
    }

    pub fn add_cell(&self, cell: LiveCell) {
        self.state.lock().live.push(cell);
    }

    pub fn is_live(&self, out_point: &OutPoint) -> bool {
        self.state.lock().live.iter().any(|cell| &cell.out_point == out_point)
    }

    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.state.lock().submitted.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submitted.len()
    }

    /// Reject the next submission with `message`
    pub fn reject_next(&self, message: &str) {
        self.state.lock().reject_next = Some(message.to_string());
    }

    /// Override the status reported for `tx_hash`
    pub fn set_status(&self, tx_hash: &H256, status: TxStatus) {
        self.state.lock().statuses.insert(tx_hash.clone(), status);
    }

    /// Report accepted transactions as pending until [`release_commits`](Self::release_commits)
    pub fn hold_commits(&self) {
        self.state.lock().hold_commits = true;
    }

    pub fn release_commits(&self) {
        self.state.lock().hold_commits = false;
    }

    /// Fail the next `count` status reads with a transport error
    pub fn fail_status_reads(&self, count: usize) {
        self.state.lock().fail_status_reads = count;
    }
}

#[async_trait]
impl NodeRpc for MockChain {
    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<H256, RpcError> {
        let mut state = self.state.lock();
        if let Some(message) = state.reject_next.take() {
            return Err(RpcError::Rejected { message, code: -301 });
        }

        let skeleton = &tx.transaction;
        for input in &skeleton.inputs {
            if !state.live.iter().any(|cell| cell.out_point == input.out_point) {
                return Err(RpcError::Rejected {
                    message: format!("dead input {}", input.out_point),
                    code: -301,
                });
            }
        }

        let tx_hash = tx.hash();
        state
            .live
            .retain(|cell| !skeleton.contains_input(&cell.out_point));
        for (index, (output, data)) in skeleton.outputs.iter().zip(&skeleton.outputs_data).enumerate() {
            state.live.push(LiveCell {
                out_point: OutPoint::new(tx_hash.clone(), index as u32),
                output: output.clone(),
                data: data.clone(),
            });
        }
        state.submitted.push(tx.clone());
        Ok(tx_hash)
    }

    async fn get_transaction_status(&self, tx_hash: &H256) -> Result<TxStatus, RpcError> {
        let mut state = self.state.lock();
        if state.fail_status_reads > 0 {
            state.fail_status_reads -= 1;
            return Err(RpcError::Transport {
                endpoint: "mock".to_string(),
                message: "connection reset".to_string(),
            });
        }
        if let Some(status) = state.statuses.get(tx_hash) {
            return Ok(status.clone());
        }
        let known = state.submitted.iter().any(|tx| &tx.hash() == tx_hash);
        Ok(match (known, state.hold_commits) {
            (false, _) => TxStatus::Unknown,
            (true, true) => TxStatus::Pending,
            (true, false) => TxStatus::Committed,
        })
    }

    async fn get_live_cell(&self, out_point: &OutPoint) -> Result<Option<LiveCell>, RpcError> {
        Ok(self
            .state
            .lock()
            .live
            .iter()
            .find(|cell| &cell.out_point == out_point)
            .cloned())
    }
}

#[async_trait]
impl CellCollector for MockChain {
    async fn list_spendable(&self, lock: &Script) -> Result<Vec<LiveCell>, RpcError> {
        Ok(self
            .state
            .lock()
            .live
            .iter()
            .filter(|cell| &cell.output.lock == lock && cell.output.is_plain())
            .cloned()
            .collect())
    }

    async fn find_type_cell(&self, type_script: &Script) -> Result<Option<LiveCell>, RpcError> {
        Ok(self
            .state
            .lock()
            .live
            .iter()
            .find(|cell| cell.output.type_.as_ref() == Some(type_script))
            .cloned())
    }
}

/// Signer that keeps the placeholder witnesses and counts signatures
pub struct MockSigner {
    lock: Script,
    address: String,
    signed: AtomicUsize,
    fail: bool,
}

impl MockSigner {
    pub fn new(seed: u8) -> Self {
        Self {
            lock: secp_lock(seed),
            address: testnet_address(seed),
            signed: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing(seed: u8) -> Self {
        Self {
            fail: true,
            ..Self::new(seed)
        }
    }

    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxSigner for MockSigner {
    fn lock_script(&self) -> &Script {
        &self.lock
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn sign(&self, skeleton: &TransactionSkeleton) -> ForgeResult<SignedTransaction> {
        if self.fail {
            return Err(ForgeError::Signing("signing service unavailable".to_string()));
        }
        self.signed.fetch_add(1, Ordering::SeqCst);
        apply_witnesses(skeleton, skeleton.witnesses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::skeleton::SkeletonInput;

    #[tokio::test]
    async fn test_accepted_transaction_moves_cells() {
        let lock = secp_lock(1);
        let funding = plain_cell(&lock, 0xaa, 0, 200 * crate::types::ONE_CKB);
        let chain = MockChain::with_cells(vec![funding.clone()]);

        let skeleton = TransactionSkeleton::new()
            .with_input(SkeletonInput::collected(&funding))
            .with_output(CellOutput::new(199 * crate::types::ONE_CKB, lock.clone(), None), Vec::new());
        let signed = MockSigner::new(1).sign(&skeleton).await.unwrap();
        let tx_hash = chain.send_transaction(&signed).await.unwrap();

        assert!(!chain.is_live(&funding.out_point));
        assert!(chain.is_live(&OutPoint::new(tx_hash.clone(), 0)));
        assert_eq!(chain.get_transaction_status(&tx_hash).await.unwrap(), TxStatus::Committed);
        assert!(chain.send_transaction(&signed).await.is_err());
    }
}
