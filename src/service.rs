//! Record transaction service
//!
//! [`SporeService`] wires the payload deriver, selector, builders, balancer
//! and signer into the operations callers use: build-and-submit a record,
//! mint a cluster, and transfer records back to a holder.

use ckb_types::H256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::address::{Network, Recipient};
use crate::codec::{h256_hex, parse_h256, parse_u64_value};
use crate::config::ScriptsConfig;
use crate::dna::{forge_payload, mint_payload, DerivedPayload, PayloadSpec};
use crate::errors::{ForgeError, ForgeResult};
use crate::metrics::{metrics, Timer};
use crate::rpc::{CellCollector, NodeRpc};
use crate::selector::{classify, Classified, ValueRef};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{
    BuildMode, CapacityBalancer, ClusterSpec, ClusterTxBuilder, InputSource, RecordPlan, RecordSubmission,
    RecordTxBuilder, SkeletonInput, TransactionSkeleton, TransferTxBuilder,
};
use crate::tx_builder::skeleton::{add_capacity, sum_capacity};
use crate::types::{CellOutput, LiveCell, Material, OutPoint};
use crate::wallet::TxSigner;

/// How the record's content is derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    /// Visual traits plus gear id of the `sequence`-th item for the recipient
    Forge { spec: PayloadSpec, sequence: u64 },
    /// Batch-mint DNA from an external reference height and token id
    Mint { reference_height: u64, token_id: u64 },
}

impl PayloadSource {
    pub fn derive(&self, cluster_id: &str, address: &str) -> ForgeResult<DerivedPayload> {
        match self {
            Self::Forge { spec, sequence } => forge_payload(cluster_id, *sequence, address, spec),
            Self::Mint {
                reference_height,
                token_id,
            } => mint_payload(cluster_id, *reference_height, *token_id, address),
        }
    }
}

/// Input of [`SporeService::build_and_submit_record_transaction`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRequest {
    #[serde(default)]
    pub materials: Vec<Material>,
    pub recipient_address: String,
    pub cluster_id: String,
    pub payload: PayloadSource,
    /// Record capacity in shannons
    #[serde(default)]
    pub capacity: Option<u64>,
    /// Refund to the recipient in shannons, replace mode only
    #[serde(default)]
    pub refund: u64,
    /// Cluster cell to reference; looked up by type script when absent
    #[serde(default)]
    pub cluster_cell: Option<OutPoint>,
}

/// Forge request body: `{sender, materials, cluster_id, reward: {btcfs: {bg, view}}, capacity?, refund?}`
#[derive(Debug, Clone, Deserialize)]
pub struct ForgeRequest {
    pub sender: String,
    #[serde(default)]
    pub materials: Vec<Material>,
    pub cluster_id: String,
    pub reward: Reward,
    #[serde(default)]
    pub capacity: Option<Value>,
    #[serde(default)]
    pub refund: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reward {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    pub btcfs: PayloadSpec,
}

impl ForgeRequest {
    pub fn into_record_request(self) -> ForgeResult<RecordRequest> {
        let capacity = self.capacity.as_ref().map(parse_u64_value).transpose()?;
        let refund = self.refund.as_ref().map(parse_u64_value).transpose()?.unwrap_or(0);
        Ok(RecordRequest {
            materials: self.materials,
            recipient_address: self.sender,
            cluster_id: self.cluster_id,
            payload: PayloadSource::Forge {
                spec: self.reward.btcfs,
                sequence: 1,
            },
            capacity,
            refund,
            cluster_cell: None,
        })
    }
}

/// Return request body: `{sender, materials}`; only record materials move
#[derive(Debug, Clone, Deserialize)]
pub struct ReturnRequest {
    pub sender: String,
    pub materials: Vec<Material>,
}

/// A cluster transaction accepted by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSubmission {
    pub cluster_id: H256,
    pub out_point: OutPoint,
    pub tx_hash: H256,
}

/// A finalized record skeleton ready for signing
#[derive(Debug, Clone)]
pub struct BuiltRecord {
    pub skeleton: TransactionSkeleton,
    pub spore_id: H256,
    pub mode: BuildMode,
    pub fee: u64,
}

pub struct SporeService {
    rpc: Arc<dyn NodeRpc>,
    collector: Arc<dyn CellCollector>,
    signer: Arc<dyn TxSigner>,
    scripts: ScriptsConfig,
    network: Network,
    fee_rate: u64,
    logger: StructuredLogger,
}

impl SporeService {
    pub fn new(
        rpc: Arc<dyn NodeRpc>,
        collector: Arc<dyn CellCollector>,
        signer: Arc<dyn TxSigner>,
        scripts: ScriptsConfig,
        network: Network,
        fee_rate: u64,
    ) -> Self {
        Self {
            rpc,
            collector,
            signer,
            scripts,
            network,
            fee_rate,
            logger: StructuredLogger::new("service"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn rpc(&self) -> Arc<dyn NodeRpc> {
        Arc::clone(&self.rpc)
    }

    fn balancer(&self) -> CapacityBalancer {
        CapacityBalancer::new(
            Arc::clone(&self.collector),
            self.signer.lock_script().clone(),
            self.fee_rate,
        )
    }

    /// Build, balance, sign and submit one record transaction
    ///
    /// Resolves once the node accepts the transaction, not on commitment.
    #[instrument(skip_all, fields(recipient = %request.recipient_address))]
    pub async fn build_and_submit_record_transaction(
        &self,
        request: RecordRequest,
    ) -> ForgeResult<RecordSubmission> {
        let built = self.build_record_transaction(&request).await?;
        let tx_hash = self.submit(&built.skeleton, built.fee).await?;
        Ok(RecordSubmission {
            tx_hash,
            skeleton: built.skeleton,
            spore_id: Some(built.spore_id),
            mode: Some(built.mode),
            fee: built.fee,
        })
    }

    /// Balanced, finalized, unsigned record skeleton
    pub async fn build_record_transaction(
        &self,
        request: &RecordRequest,
    ) -> ForgeResult<BuiltRecord> {
        let timer = Timer::new();
        let recipient = Recipient::parse(&request.recipient_address, self.network)?;
        let payload = request.payload.derive(&request.cluster_id, &recipient.address)?;
        let classified = classify(&request.materials);
        self.check_requested_capacity(request, &classified)?;

        let mut record_inputs = Vec::with_capacity(classified.record_refs.len());
        for (out_point, amount) in classified.record_refs.iter().zip(&classified.record_amounts) {
            let capacity = self.resolve_capacity(out_point, *amount).await?;
            record_inputs.push(SkeletonInput::new(out_point.clone(), capacity, InputSource::Record));
        }
        let mut value_inputs = Vec::with_capacity(classified.value_refs.len());
        if !classified.is_create() {
            for ValueRef { out_point, amount } in &classified.value_refs {
                let capacity = self.resolve_capacity(out_point, *amount).await?;
                value_inputs.push(SkeletonInput::new(out_point.clone(), capacity, InputSource::Supplied));
            }
        }

        let cluster_cell = match &request.cluster_cell {
            Some(out_point) => Some(out_point.clone()),
            None => Some(self.find_cluster_cell(&request.cluster_id).await?),
        };

        let plan = RecordPlan {
            record_inputs,
            value_inputs,
            payload,
            recipient,
            capacity: request.capacity,
            refund: request.refund,
            cluster_cell,
        };
        let mode = plan.mode();
        let builder = RecordTxBuilder::new(self.scripts.clone());
        let assembled = builder.assemble(&plan)?;
        let (balanced, report) = self.balancer().balance(assembled).await?;
        let (skeleton, spore_id) = builder.finalize(balanced)?;

        timer.observe_duration(&metrics().build_latency);
        debug!(
            spore_id = %h256_hex(&spore_id),
            mode = ?mode,
            cells_collected = report.cells_collected,
            "Record transaction built"
        );
        Ok(BuiltRecord {
            skeleton,
            spore_id,
            mode,
            fee: report.fee,
        })
    }

    /// Build, balance, sign and submit a cluster cell owned by the signer
    #[instrument(skip_all, fields(cluster = %spec.name))]
    pub async fn mint_cluster(&self, spec: &ClusterSpec) -> ForgeResult<ClusterSubmission> {
        let timer = Timer::new();
        let builder = ClusterTxBuilder::new(self.scripts.clone());
        let assembled = builder.assemble(spec, self.signer.lock_script())?;
        let (balanced, report) = self.balancer().balance(assembled).await?;
        let (skeleton, cluster_id) = builder.finalize(balanced)?;
        timer.observe_duration(&metrics().build_latency);

        let tx_hash = self.submit(&skeleton, report.fee).await?;
        info!(cluster_id = %h256_hex(&cluster_id), tx_hash = %h256_hex(&tx_hash), "Cluster submitted");
        Ok(ClusterSubmission {
            cluster_id,
            out_point: OutPoint::new(tx_hash.clone(), 0),
            tx_hash,
        })
    }

    /// Transfer every record material unchanged to `recipient_address`
    ///
    /// The fee comes out of the first record's capacity margin.
    #[instrument(skip_all, fields(recipient = %recipient_address))]
    pub async fn return_records(
        &self,
        materials: &[Material],
        recipient_address: &str,
    ) -> ForgeResult<RecordSubmission> {
        let recipient = Recipient::parse(recipient_address, self.network)?;
        let classified = classify(materials);
        if classified.is_create() {
            return Err(ForgeError::malformed("return requires at least one record material"));
        }

        let mut cells: Vec<LiveCell> = Vec::with_capacity(classified.record_refs.len());
        for out_point in &classified.record_refs {
            let cell = self
                .rpc
                .get_live_cell(out_point)
                .await?
                .ok_or_else(|| ForgeError::CellNotFound(out_point.clone()))?;
            cells.push(cell);
        }

        let skeleton = TransferTxBuilder::new(self.scripts.clone(), self.fee_rate)
            .build(&cells, &recipient.lock)?;
        let fee = skeleton
            .input_capacity()?
            .saturating_sub(skeleton.output_capacity()?);
        let tx_hash = self.submit(&skeleton, fee).await?;
        Ok(RecordSubmission {
            tx_hash,
            skeleton,
            spore_id: None,
            mode: None,
            fee,
        })
    }

    /// Sign and submit; failures are logged with the skeleton for reconciliation
    pub async fn submit(&self, skeleton: &TransactionSkeleton, fee: u64) -> ForgeResult<H256> {
        match self.signer.sign_and_submit(skeleton, self.rpc.as_ref()).await {
            Ok(tx_hash) => {
                metrics().transactions_submitted.inc();
                self.logger.log_submission(
                    &h256_hex(&tx_hash),
                    skeleton.inputs.len(),
                    skeleton.outputs.len(),
                    fee,
                );
                Ok(tx_hash)
            }
            Err(e) => {
                metrics().submission_failures.inc();
                self.logger.log_submission_failure(skeleton, &e);
                Err(e)
            }
        }
    }

    /// Supplied amounts, and the requested outputs plus a change cell, must fit in `u64`
    fn check_requested_capacity(&self, request: &RecordRequest, classified: &Classified) -> ForgeResult<()> {
        let supplied = classified
            .record_amounts
            .iter()
            .flatten()
            .chain(classified.value_refs.iter().filter_map(|v| v.amount.as_ref()));
        sum_capacity(supplied.copied())?;

        let change = CellOutput::new(0, self.signer.lock_script().clone(), None).occupied_capacity(0);
        let requested = add_capacity(request.capacity.unwrap_or(0), request.refund)?;
        add_capacity(requested, change)?;
        Ok(())
    }

    /// Supplied amount, or the live cell's capacity when none was given
    async fn resolve_capacity(&self, out_point: &OutPoint, amount: Option<u64>) -> ForgeResult<u64> {
        if let Some(amount) = amount {
            return Ok(amount);
        }
        let cell = self
            .rpc
            .get_live_cell(out_point)
            .await?
            .ok_or_else(|| ForgeError::CellNotFound(out_point.clone()))?;
        Ok(cell.capacity())
    }

    async fn find_cluster_cell(&self, cluster_id: &str) -> ForgeResult<OutPoint> {
        let id = parse_h256(cluster_id)?;
        let type_script = self.scripts.cluster.script(id.0.to_vec());
        let cell = self
            .collector
            .find_type_cell(&type_script)
            .await?
            .ok_or_else(|| ForgeError::malformed(format!("cluster {cluster_id} has no live cell")))?;
        Ok(cell.out_point)
    }
}
