//! Record (spore) transaction assembly
//!
//! Assembly lays out inputs and outputs for one record transaction; funding
//! is left to [`CapacityBalancer`](super::balancer::CapacityBalancer), and the
//! spore id is filled in by [`RecordTxBuilder::finalize`] once the first input
//! is known.

use ckb_types::H256;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::Recipient;
use crate::config::ScriptsConfig;
use crate::dna::DerivedPayload;
use crate::errors::{ForgeError, ForgeResult};
use crate::tx_builder::skeleton::{type_id_args, SkeletonInput, TransactionSkeleton};
use crate::types::{CellDep, CellOutput, DepType, OutPoint, ONE_CKB};

/// Spore ids are type ids: always 32 bytes
pub const SPORE_ID_LEN: usize = 32;

/// Margin added above occupancy when no capacity is requested
pub const DEFAULT_CAPACITY_MARGIN: u64 = ONE_CKB;

/// Index of the record output in every record transaction
pub const RECORD_OUTPUT_INDEX: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Mint a fresh record funded by the signer
    Create,
    /// Melt supplied records and mint a replacement
    Replace,
}

/// Everything needed to lay out a record transaction, with input capacities resolved
#[derive(Debug, Clone)]
pub struct RecordPlan {
    pub record_inputs: Vec<SkeletonInput>,
    pub value_inputs: Vec<SkeletonInput>,
    pub payload: DerivedPayload,
    pub recipient: Recipient,
    /// Record capacity in shannons; occupancy plus one CKB when `None`
    pub capacity: Option<u64>,
    /// Refund to the recipient in shannons, replace mode only
    pub refund: u64,
    /// Live cell of the payload's cluster, referenced as a cell dep
    pub cluster_cell: Option<OutPoint>,
}

impl RecordPlan {
    pub fn mode(&self) -> BuildMode {
        if self.record_inputs.is_empty() {
            BuildMode::Create
        } else {
            BuildMode::Replace
        }
    }
}

/// Lays out record transactions against a set of script deployments
#[derive(Debug, Clone)]
pub struct RecordTxBuilder {
    scripts: ScriptsConfig,
}

impl RecordTxBuilder {
    pub fn new(scripts: ScriptsConfig) -> Self {
        Self { scripts }
    }

    /// Record output with a zeroed spore id, as priced before finalization
    pub fn record_output(&self, plan: &RecordPlan, data_len: usize) -> ForgeResult<CellOutput> {
        let type_script = self.scripts.spore.script(vec![0u8; SPORE_ID_LEN]);
        let template = CellOutput::new(0, plan.recipient.lock.clone(), Some(type_script));
        let occupied = template.occupied_capacity(data_len);
        let capacity = plan.capacity.unwrap_or(occupied + DEFAULT_CAPACITY_MARGIN);
        if capacity < occupied {
            return Err(ForgeError::OccupancyViolation {
                index: RECORD_OUTPUT_INDEX,
                capacity,
                occupied,
            });
        }
        Ok(template.with_capacity(capacity))
    }

    /// Unbalanced skeleton: record output first, refund second in replace mode
    pub fn assemble(&self, plan: &RecordPlan) -> ForgeResult<TransactionSkeleton> {
        let mode = plan.mode();
        let data = plan.payload.to_cell_data();
        let record = self.record_output(plan, data.len())?;

        let mut skeleton = TransactionSkeleton::new()
            .with_cell_dep(self.scripts.spore.cell_dep.clone())
            .with_cell_dep(self.scripts.secp256k1.clone());
        if let Some(cluster_cell) = &plan.cluster_cell {
            skeleton = skeleton.with_cell_dep(CellDep {
                out_point: cluster_cell.clone(),
                dep_type: DepType::Code,
            });
        }

        match mode {
            BuildMode::Create => {
                if !plan.value_inputs.is_empty() {
                    debug!(
                        ignored = plan.value_inputs.len(),
                        "Create mode funds from the signer; supplied value cells ignored"
                    );
                }
            }
            BuildMode::Replace => {
                for input in plan.record_inputs.iter().chain(&plan.value_inputs) {
                    skeleton = skeleton.with_input(input.clone());
                }
            }
        }

        skeleton = skeleton.with_output(record, data);

        if plan.refund > 0 {
            match mode {
                BuildMode::Create => {
                    warn!(refund = plan.refund, "Refund requested in create mode, ignoring");
                }
                BuildMode::Replace => {
                    let refund = CellOutput::new(plan.refund, plan.recipient.lock.clone(), None);
                    let occupied = refund.occupied_capacity(0);
                    if plan.refund < occupied {
                        return Err(ForgeError::OccupancyViolation {
                            index: skeleton.outputs.len(),
                            capacity: plan.refund,
                            occupied,
                        });
                    }
                    skeleton = skeleton.with_output(refund, Vec::new());
                }
            }
        }

        debug!(
            mode = ?mode,
            inputs = skeleton.inputs.len(),
            outputs = skeleton.outputs.len(),
            "Assembled record skeleton"
        );
        Ok(skeleton)
    }

    /// Fill the spore id of the record output from the balanced skeleton's first input
    pub fn finalize(&self, skeleton: TransactionSkeleton) -> ForgeResult<(TransactionSkeleton, H256)> {
        let first = skeleton
            .first_input()
            .cloned()
            .ok_or_else(|| ForgeError::internal("balanced skeleton has no inputs"))?;
        let spore_id = type_id_args(&first, RECORD_OUTPUT_INDEX as u64);

        let record = skeleton
            .outputs
            .get(RECORD_OUTPUT_INDEX)
            .ok_or_else(|| ForgeError::internal("skeleton has no record output"))?;
        let type_script = record
            .type_
            .as_ref()
            .ok_or_else(|| ForgeError::internal("record output has no type script"))?
            .with_args(spore_id.to_vec());
        let record = CellOutput::new(record.capacity, record.lock.clone(), Some(type_script));

        let skeleton = skeleton.with_output_at(RECORD_OUTPUT_INDEX, record)?;
        skeleton.verify_occupancy()?;
        Ok((skeleton, H256(spore_id)))
    }
}
