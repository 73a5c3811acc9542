//! Idempotent batch driver
//!
//! Every side-effecting step runs under a step key. Before acting, the driver
//! reads the step log: a record means the step's transaction was accepted in
//! an earlier run, so its payload is reused and nothing is submitted. The
//! record is written as soon as the node accepts the transaction, carrying
//! its hash. With confirmation polling on, commitment is recorded separately
//! under `<step key>.committed`; a rerun that finds a record without that
//! marker polls the recorded hash again instead of resubmitting.
//!
//! Steps run strictly one after another; the first failure stops the batch.

use ckb_types::H256;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};

use crate::codec::h256_hex;
use crate::dna::derive_dna;
use crate::errors::{ForgeError, ForgeResult};
use crate::metrics::metrics;
use crate::observability::RunContext;
use crate::service::{PayloadSource, RecordRequest, SporeService};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::cluster::ClusterSpec;
use crate::types::OutPoint;
use crate::workflow::confirm::ConfirmationPoller;
use crate::workflow::mint_list::MintItem;
use crate::workflow::step_log::{StepLog, StepRecord};

pub fn cluster_step_key(cluster_no: u32) -> String {
    format!("cluster-{cluster_no}")
}

pub fn mint_step_key(batch_no: usize, token_id: u64) -> String {
    format!("mint-{batch_no}-{token_id}")
}

/// Key of the marker written once a step's transaction is committed
pub fn committed_step_key(step_key: &str) -> String {
    format!("{step_key}.committed")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    NotStarted,
    InFlight,
    Completed,
}

/// Payload of a `cluster-<no>` step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster_id: H256,
    /// Live cluster cell, referenced by every mint into the cluster
    pub out_point: OutPoint,
    pub tx_hash: H256,
}

/// Payload of a `mint-<batch>-<token>` step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    pub tx_hash: H256,
    pub spore_id: H256,
    pub dna: String,
    pub address: String,
    pub token_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    /// Executed in this run
    Completed(T),
    /// A record already existed; payload read back from it
    Skipped(T),
}

impl<T> StepOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Completed(value) | Self::Skipped(value) => value,
        }
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_no: usize,
    pub minted: Vec<MintRecord>,
    pub skipped: Vec<MintRecord>,
}

impl BatchReport {
    pub fn submitted(&self) -> usize {
        self.minted.len()
    }
}

/// Marks a step in flight until dropped
struct InFlight<'a> {
    steps: &'a Mutex<HashSet<String>>,
    step_key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.steps.lock().remove(&self.step_key);
    }
}

pub struct BatchDriver {
    service: Arc<SporeService>,
    step_log: Arc<dyn StepLog>,
    poller: Option<ConfirmationPoller>,
    run: RunContext,
    logger: StructuredLogger,
    in_flight: Mutex<HashSet<String>>,
}

impl BatchDriver {
    /// `poller = None` records steps as soon as the node accepts the transaction
    pub fn new(
        service: Arc<SporeService>,
        step_log: Arc<dyn StepLog>,
        poller: Option<ConfirmationPoller>,
        run: RunContext,
    ) -> Self {
        let logger = StructuredLogger::new(run.correlation_id.as_str());
        Self {
            service,
            step_log,
            poller,
            run,
            logger,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn run_context(&self) -> &RunContext {
        &self.run
    }

    pub fn step_state(&self, step_key: &str) -> ForgeResult<StepState> {
        if self.step_log.exists(step_key)? {
            Ok(StepState::Completed)
        } else if self.in_flight.lock().contains(step_key) {
            Ok(StepState::InFlight)
        } else {
            Ok(StepState::NotStarted)
        }
    }

    fn begin(&self, step_key: &str) -> ForgeResult<InFlight<'_>> {
        let mut steps = self.in_flight.lock();
        if !steps.insert(step_key.to_string()) {
            return Err(ForgeError::internal(format!("step {step_key} is already in flight")));
        }
        Ok(InFlight {
            steps: &self.in_flight,
            step_key: step_key.to_string(),
        })
    }

    /// Whether the commit marker of `step_key` exists
    pub fn is_committed(&self, step_key: &str) -> ForgeResult<bool> {
        self.step_log.exists(&committed_step_key(step_key))
    }

    /// Run `action` under `step_key` unless a record for it exists
    ///
    /// `action` returns the hash of the transaction the node accepted and the
    /// payload to record for it.
    pub async fn run_step<T, F, Fut>(&self, step_key: &str, action: F) -> ForgeResult<StepOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ForgeResult<(H256, T)>>,
    {
        if let Some(record) = self.step_log.read(step_key)? {
            self.logger.log_step_skipped(step_key);
            metrics().steps_skipped.inc();
            self.resume_confirmation(&record).await?;
            let payload = serde_json::from_value(record.payload)
                .map_err(|e| ForgeError::step_log(format!("record {step_key} unreadable: {e}")))?;
            return Ok(StepOutcome::Skipped(payload));
        }

        let _in_flight = self.begin(step_key)?;
        let started = Instant::now();
        self.logger.log_step_started(step_key);

        let (tx_hash, payload) = action().await?;

        let value = serde_json::to_value(&payload)
            .map_err(|e| ForgeError::internal(format!("encode payload of {step_key}: {e}")))?;
        let record = StepRecord::submitted(step_key, tx_hash.clone(), value);
        match self.step_log.write_record(&record) {
            Ok(()) => {}
            Err(e) if e.is_already_completed() => {
                warn!(step_key, "Step recorded concurrently, keeping the existing record");
            }
            Err(e) => {
                self.logger
                    .log_record_write_failure(step_key, &h256_hex(&tx_hash), &e);
                return Err(e);
            }
        }

        if let Some(poller) = &self.poller {
            poller.wait_committed(&tx_hash).await?;
            self.mark_committed(step_key, &tx_hash)?;
        }

        metrics().steps_completed.inc();
        self.logger.log_step_completed(
            step_key,
            &h256_hex(&tx_hash),
            started.elapsed().as_millis() as u64,
        );
        Ok(StepOutcome::Completed(payload))
    }

    /// Poll a recorded but unconfirmed step's transaction until it commits
    async fn resume_confirmation(&self, record: &StepRecord) -> ForgeResult<()> {
        let (Some(poller), Some(tx_hash)) = (&self.poller, &record.tx_hash) else {
            return Ok(());
        };
        if self.is_committed(&record.step_key)? {
            return Ok(());
        }

        info!(
            step_key = %record.step_key,
            tx_hash = %h256_hex(tx_hash),
            "Step submitted in an earlier run, resuming confirmation"
        );
        poller.wait_committed(tx_hash).await?;
        self.mark_committed(&record.step_key, tx_hash)
    }

    fn mark_committed(&self, step_key: &str, tx_hash: &H256) -> ForgeResult<()> {
        let marker = committed_step_key(step_key);
        let payload = serde_json::json!({ "tx_hash": h256_hex(tx_hash) });
        match self.step_log.write(&marker, &payload) {
            Err(e) if !e.is_already_completed() => {
                warn!(step_key, error = %e, "Commit marker not written; a rerun polls again");
                Err(e)
            }
            _ => Ok(()),
        }
    }

    /// Mint cluster `cluster_no` once; later calls return the recorded cluster
    pub async fn ensure_cluster(&self, cluster_no: u32, spec: &ClusterSpec) -> ForgeResult<ClusterRecord> {
        let step_key = cluster_step_key(cluster_no);
        let service = Arc::clone(&self.service);
        let outcome = self
            .run_step(&step_key, || async move {
                let submission = service.mint_cluster(spec).await?;
                let record = ClusterRecord {
                    cluster_id: submission.cluster_id,
                    out_point: submission.out_point,
                    tx_hash: submission.tx_hash.clone(),
                };
                Ok((submission.tx_hash, record))
            })
            .instrument(self.run.span())
            .await?;
        Ok(outcome.into_inner())
    }

    /// Recorded cluster, if its step completed
    pub fn cluster_record(&self, cluster_no: u32) -> ForgeResult<Option<ClusterRecord>> {
        let step_key = cluster_step_key(cluster_no);
        self.step_log
            .read(&step_key)?
            .map(|record| {
                serde_json::from_value(record.payload)
                    .map_err(|e| ForgeError::step_log(format!("record {step_key} unreadable: {e}")))
            })
            .transpose()
    }

    /// Mint one record per item into `cluster`, skipping items already recorded
    pub async fn mint_batch(
        &self,
        batch_no: usize,
        items: &[MintItem],
        cluster: &ClusterRecord,
        reference_height: u64,
    ) -> ForgeResult<BatchReport> {
        let span = self.run.span();
        async move {
            let mut report = BatchReport {
                batch_no,
                ..BatchReport::default()
            };
            info!(batch_no, items = items.len(), "Starting batch");

            for item in items {
                let step_key = mint_step_key(batch_no, item.token_id);
                let outcome = self
                    .run_step(&step_key, || self.mint_one(item, cluster, reference_height))
                    .await?;
                match outcome {
                    StepOutcome::Completed(record) => report.minted.push(record),
                    StepOutcome::Skipped(record) => report.skipped.push(record),
                }
            }

            info!(
                batch_no,
                minted = report.minted.len(),
                skipped = report.skipped.len(),
                "Batch finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn mint_one(
        &self,
        item: &MintItem,
        cluster: &ClusterRecord,
        reference_height: u64,
    ) -> ForgeResult<(H256, MintRecord)> {
        let request = RecordRequest {
            materials: Vec::new(),
            recipient_address: item.address.clone(),
            cluster_id: h256_hex(&cluster.cluster_id),
            payload: PayloadSource::Mint {
                reference_height,
                token_id: item.token_id,
            },
            capacity: None,
            refund: 0,
            cluster_cell: Some(cluster.out_point.clone()),
        };
        let submission = self.service.build_and_submit_record_transaction(request).await?;
        let spore_id = submission
            .spore_id
            .clone()
            .ok_or_else(|| ForgeError::internal("record submission without spore id"))?;
        let record = MintRecord {
            tx_hash: submission.tx_hash.clone(),
            spore_id,
            dna: derive_dna(reference_height, item.token_id, &item.address).to_string(),
            address: item.address.clone(),
            token_id: item.token_id,
        };
        Ok((submission.tx_hash, record))
    }
}
