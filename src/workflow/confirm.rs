//! Commitment polling

use ckb_types::H256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::codec::h256_hex;
use crate::errors::{ForgeError, ForgeResult};
use crate::rpc::{NodeRpc, TxStatus};

/// Polls a transaction's status at a fixed interval until it is committed
#[derive(Clone)]
pub struct ConfirmationPoller {
    rpc: Arc<dyn NodeRpc>,
    interval: Duration,
    timeout: Duration,
}

impl ConfirmationPoller {
    pub fn new(rpc: Arc<dyn NodeRpc>, interval: Duration, timeout: Duration) -> Self {
        Self {
            rpc,
            interval,
            timeout,
        }
    }

    /// Resolve once committed; fail on rejection or after the timeout
    ///
    /// Read errors are logged and polling continues.
    pub async fn wait_committed(&self, tx_hash: &H256) -> ForgeResult<()> {
        let hash = h256_hex(tx_hash);
        let started = Instant::now();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt = 0u32;

        loop {
            ticker.tick().await;
            attempt += 1;
            info!(tx_hash = %hash, attempt, "Waiting for transaction to be committed");

            match self.rpc.get_transaction_status(tx_hash).await {
                Ok(TxStatus::Committed) => {
                    info!(
                        tx_hash = %hash,
                        attempts = attempt,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Transaction committed"
                    );
                    return Ok(());
                }
                Ok(TxStatus::Rejected(reason)) => {
                    let reason = reason.unwrap_or_else(|| "no reason given".to_string());
                    error!(tx_hash = %hash, reason = %reason, "Transaction rejected by the pool");
                    return Err(ForgeError::submission(format!("{hash} rejected: {reason}")));
                }
                Ok(status) => debug!(tx_hash = %hash, status = ?status, "Not committed yet"),
                Err(e) => warn!(tx_hash = %hash, error = %e, "Status poll failed"),
            }

            if started.elapsed() >= self.timeout {
                return Err(ForgeError::ConfirmationTimeout {
                    tx_hash: hash,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
        }
    }
}
