//! Record transfer: move record cells unchanged to a new lock
//!
//! No value cells are pulled in. The fee is taken from the first record's
//! capacity margin, so the transaction balances without a change output.

use tracing::debug;

use crate::config::ScriptsConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::tx_builder::skeleton::{InputSource, SkeletonInput, TransactionSkeleton};
use crate::types::{CellOutput, LiveCell, Script};

#[derive(Debug, Clone)]
pub struct TransferTxBuilder {
    scripts: ScriptsConfig,
    fee_rate: u64,
}

impl TransferTxBuilder {
    pub fn new(scripts: ScriptsConfig, fee_rate: u64) -> Self {
        Self { scripts, fee_rate }
    }

    /// Balanced skeleton moving every cell in `records` to `recipient_lock`
    pub fn build(&self, records: &[LiveCell], recipient_lock: &Script) -> ForgeResult<TransactionSkeleton> {
        if records.is_empty() {
            return Err(ForgeError::malformed("no record cells to transfer"));
        }

        let mut skeleton = TransactionSkeleton::new()
            .with_cell_dep(self.scripts.spore.cell_dep.clone())
            .with_cell_dep(self.scripts.secp256k1.clone());
        for cell in records {
            if cell.output.type_.is_none() {
                return Err(ForgeError::malformed(format!(
                    "cell {} carries no type script and is not a record",
                    cell.out_point
                )));
            }
            let moved = cell.output.clone();
            skeleton = skeleton
                .with_input(SkeletonInput::new(
                    cell.out_point.clone(),
                    cell.capacity(),
                    InputSource::Record,
                ))
                .with_output(
                    CellOutput::new(moved.capacity, recipient_lock.clone(), moved.type_),
                    cell.data.clone(),
                );
        }

        // Capacities do not change the serialized size
        let fee = skeleton.fee(self.fee_rate);
        let first = skeleton.outputs[0].clone();
        let occupied = first.occupied_capacity(skeleton.outputs_data[0].len());
        let margin = first.capacity.saturating_sub(occupied);
        if margin < fee {
            return Err(ForgeError::InsufficientInput {
                needed: fee - margin,
                available: margin,
            });
        }

        let paying = first.with_capacity(first.capacity - fee);
        let skeleton = skeleton.with_output_at(0, paying)?;
        skeleton.verify_occupancy()?;
        skeleton.verify_balance(self.fee_rate)?;
        debug!(records = records.len(), fee, "Assembled transfer skeleton");
        Ok(skeleton)
    }
}
