//! Needed/exceed capacity balancing
//!
//! Each pass computes two quantities against the current skeleton:
//!
//! - **needed**: capacity still missing so that inputs cover outputs, the fee
//!   and (when there will be a remainder) a viable change cell. While positive,
//!   the balancer appends plain value cells from the collector.
//! - **exceed**: what inputs hold beyond outputs and fee. Once nothing is
//!   needed, a positive exceed becomes a change output to the signer, sized
//!   so the fee is paid on the final serialized size.
//!
//! Capacity only flows in while needed is positive and only flows out into
//! the change cell, so the loop terminates once the collector's cells are
//! exhausted or the skeleton balances exactly.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{ForgeError, ForgeResult};
use crate::metrics::metrics;
use crate::rpc::CellCollector;
use crate::tx_builder::skeleton::{add_capacity, SkeletonInput, TransactionSkeleton};
use crate::types::{format_ckb, CellOutput, LiveCell, Script};

/// Transient per-pass view of the skeleton's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancingState {
    pub needed_capacity: u64,
    pub exceed_capacity: u64,
}

/// What a balancing run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport {
    pub cells_collected: usize,
    pub fee: u64,
    /// Capacity of the appended change output, if any
    pub change: Option<u64>,
    pub passes: usize,
}

pub struct CapacityBalancer {
    collector: Arc<dyn CellCollector>,
    change_lock: Script,
    fee_rate: u64,
}

impl CapacityBalancer {
    pub fn new(collector: Arc<dyn CellCollector>, change_lock: Script, fee_rate: u64) -> Self {
        Self {
            collector,
            change_lock,
            fee_rate,
        }
    }

    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }

    fn change_template(&self) -> CellOutput {
        CellOutput::new(0, self.change_lock.clone(), None)
    }

    /// Capacity state of `skeleton` at this balancer's fee rate
    ///
    /// Capacities that overflow `u64` are `MalformedInput`.
    pub fn state(&self, skeleton: &TransactionSkeleton) -> ForgeResult<BalancingState> {
        let inputs = skeleton.input_capacity()?;
        let outputs = skeleton.output_capacity()?;
        let exact = add_capacity(outputs, skeleton.fee(self.fee_rate))?;

        if inputs == exact {
            return Ok(BalancingState {
                needed_capacity: 0,
                exceed_capacity: 0,
            });
        }

        // Any remainder must fit a change cell, priced with the change present
        let change = self.change_template();
        let with_change = skeleton.clone().with_output(change.clone(), Vec::new());
        let target = add_capacity(
            add_capacity(outputs, with_change.fee(self.fee_rate))?,
            change.occupied_capacity(0),
        )?;

        Ok(BalancingState {
            needed_capacity: target.saturating_sub(inputs),
            exceed_capacity: inputs.saturating_sub(exact),
        })
    }

    /// Fund `skeleton` and return it balanced with `inputs == outputs + fee`
    pub async fn balance(
        &self,
        skeleton: TransactionSkeleton,
    ) -> ForgeResult<(TransactionSkeleton, BalanceReport)> {
        let mut skeleton = skeleton;
        let mut pool: Option<VecDeque<LiveCell>> = None;
        let mut cells_collected = 0;
        let mut passes = 0;

        loop {
            passes += 1;
            let state = self.state(&skeleton)?;
            debug!(
                pass = passes,
                needed = state.needed_capacity,
                exceed = state.exceed_capacity,
                "Balancing pass"
            );
            if state.needed_capacity == 0 {
                break;
            }

            if pool.is_none() {
                let cells = self.collector.list_spendable(&self.change_lock).await?;
                pool = Some(cells.into_iter().collect());
            }
            let next = pool.as_mut().and_then(|cells| self.next_candidate(cells, &skeleton));

            match next {
                Some(cell) => {
                    debug!(
                        out_point = %cell.out_point,
                        capacity = %format_ckb(cell.capacity()),
                        "Collected value cell"
                    );
                    skeleton = skeleton.with_input(SkeletonInput::collected(&cell));
                    cells_collected += 1;
                }
                None if skeleton.inputs.is_empty() => {
                    return Err(ForgeError::no_spendable(
                        "signer has no plain value cells and none were supplied",
                    ));
                }
                None => {
                    return Err(ForgeError::InsufficientInput {
                        needed: state.needed_capacity,
                        available: skeleton.input_capacity()?,
                    });
                }
            }
        }

        let (skeleton, change) = self.settle(skeleton)?;
        let fee = skeleton.fee(self.fee_rate);
        skeleton.verify_balance(self.fee_rate)?;

        metrics()
            .balancer_cells_collected
            .inc_by(cells_collected as u64);
        info!(
            inputs = skeleton.inputs.len(),
            outputs = skeleton.outputs.len(),
            cells_collected,
            fee,
            "Skeleton balanced"
        );

        Ok((
            skeleton,
            BalanceReport {
                cells_collected,
                fee,
                change,
                passes,
            },
        ))
    }

    /// Next unused plain cell from the pool, in collector order
    fn next_candidate(
        &self,
        pool: &mut VecDeque<LiveCell>,
        skeleton: &TransactionSkeleton,
    ) -> Option<LiveCell> {
        while let Some(cell) = pool.pop_front() {
            if cell.output.is_plain() && !skeleton.contains_input(&cell.out_point) {
                return Some(cell);
            }
        }
        None
    }

    /// Drain any exceed into a change output priced at the final size
    fn settle(&self, skeleton: TransactionSkeleton) -> ForgeResult<(TransactionSkeleton, Option<u64>)> {
        let inputs = skeleton.input_capacity()?;
        let outputs = skeleton.output_capacity()?;
        if inputs == add_capacity(outputs, skeleton.fee(self.fee_rate))? {
            return Ok((skeleton, None));
        }

        let with_change = skeleton.with_output(self.change_template(), Vec::new());
        let fee = with_change.fee(self.fee_rate);
        let change = inputs
            .checked_sub(add_capacity(outputs, fee)?)
            .ok_or_else(|| ForgeError::internal("change priced below zero after funding"))?;

        let change_index = with_change.outputs.len() - 1;
        let skeleton =
            with_change.with_output_at(change_index, self.change_template().with_capacity(change))?;
        skeleton.verify_occupancy()?;
        Ok((skeleton, Some(change)))
    }
}
