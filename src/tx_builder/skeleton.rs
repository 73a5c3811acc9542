//! Immutable transaction skeleton
//!
//! A [`TransactionSkeleton`] is an unsigned transaction under construction.
//! Every mutation returns a new value, so a builder stage can keep the
//! skeleton it started from (the balancer relies on this to price a
//! candidate change output without committing to it).
//!
//! Witnesses are placeholders: the first input carries a `WitnessArgs` with a
//! 65-byte zeroed lock, the others are empty. Fee estimation runs against this
//! shape so the signed transaction has the same size.

use ckb_hash::new_blake2b;
use ckb_types::{core, packed, prelude::*, H256};
use serde::{Deserialize, Serialize};

use crate::errors::{ForgeError, ForgeResult};
use crate::types::{CellDep, CellOutput, LiveCell, OutPoint};

/// Signature size of a secp256k1 recoverable signature
pub const SIGNATURE_PLACEHOLDER_LEN: usize = 65;

/// Fee for a transaction of `size` bytes at `fee_rate` shannons per 1000 bytes, rounded up
pub fn fee_for_size(size: u64, fee_rate: u64) -> u64 {
    size.saturating_mul(fee_rate).div_ceil(1000)
}

/// `a + b`, or `MalformedInput` when the capacities overflow
pub fn add_capacity(a: u64, b: u64) -> ForgeResult<u64> {
    a.checked_add(b)
        .ok_or_else(|| ForgeError::malformed(format!("capacity {a} + {b} overflows u64")))
}

/// Sum of `capacities`, or `MalformedInput` on overflow
pub fn sum_capacity(capacities: impl IntoIterator<Item = u64>) -> ForgeResult<u64> {
    capacities.into_iter().try_fold(0u64, add_capacity)
}

/// Type id args of the output at `output_index` in a transaction whose first input is `first_input`
pub fn type_id_args(first_input: &OutPoint, output_index: u64) -> [u8; 32] {
    let mut blake2b = new_blake2b();
    blake2b.update(first_input.to_cell_input().as_slice());
    blake2b.update(&output_index.to_le_bytes());
    let mut out = [0u8; 32];
    blake2b.finalize(&mut out);
    out
}

/// `WitnessArgs { lock: Some(65 zero bytes) }`
pub fn placeholder_witness() -> Vec<u8> {
    let lock = packed::BytesOpt::new_builder()
        .set(Some([0u8; SIGNATURE_PLACEHOLDER_LEN][..].pack()))
        .build();
    packed::WitnessArgs::new_builder()
        .lock(lock)
        .build()
        .as_bytes()
        .to_vec()
}

/// Where an input came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// Caller-supplied record cell, melted by the transaction
    Record,
    /// Caller-supplied value cell
    Supplied,
    /// Pulled from the signer's spendable cells by the balancer
    Collected,
}

/// An input together with the capacity it contributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonInput {
    pub out_point: OutPoint,
    pub capacity: u64,
    pub source: InputSource,
}

impl SkeletonInput {
    pub fn new(out_point: OutPoint, capacity: u64, source: InputSource) -> Self {
        Self {
            out_point,
            capacity,
            source,
        }
    }

    pub fn collected(cell: &LiveCell) -> Self {
        Self::new(cell.out_point.clone(), cell.capacity(), InputSource::Collected)
    }
}

/// Unsigned transaction under construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSkeleton {
    pub cell_deps: Vec<CellDep>,
    pub inputs: Vec<SkeletonInput>,
    pub outputs: Vec<CellOutput>,
    #[serde(with = "hex_vec")]
    pub outputs_data: Vec<Vec<u8>>,
    #[serde(with = "hex_vec")]
    pub witnesses: Vec<Vec<u8>>,
}

impl TransactionSkeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell dep unless an identical one is present
    pub fn with_cell_dep(mut self, dep: CellDep) -> Self {
        if !self.cell_deps.contains(&dep) {
            self.cell_deps.push(dep);
        }
        self
    }

    pub fn with_input(mut self, input: SkeletonInput) -> Self {
        self.inputs.push(input);
        self.witnesses = Self::placeholder_witnesses(self.inputs.len());
        self
    }

    pub fn with_output(mut self, output: CellOutput, data: Vec<u8>) -> Self {
        self.outputs.push(output);
        self.outputs_data.push(data);
        self
    }

    /// Replace the output at `index`, keeping its data
    pub fn with_output_at(mut self, index: usize, output: CellOutput) -> ForgeResult<Self> {
        let slot = self
            .outputs
            .get_mut(index)
            .ok_or_else(|| ForgeError::internal(format!("no output #{index} to replace")))?;
        *slot = output;
        Ok(self)
    }

    /// Replace the witnesses, e.g. with the signer's
    pub fn with_witnesses(mut self, witnesses: Vec<Vec<u8>>) -> Self {
        self.witnesses = witnesses;
        self
    }

    fn placeholder_witnesses(inputs: usize) -> Vec<Vec<u8>> {
        (0..inputs)
            .map(|i| if i == 0 { placeholder_witness() } else { Vec::new() })
            .collect()
    }

    pub fn contains_input(&self, out_point: &OutPoint) -> bool {
        self.inputs.iter().any(|input| &input.out_point == out_point)
    }

    pub fn input_capacity(&self) -> ForgeResult<u64> {
        sum_capacity(self.inputs.iter().map(|input| input.capacity))
    }

    pub fn output_capacity(&self) -> ForgeResult<u64> {
        sum_capacity(self.outputs.iter().map(|output| output.capacity))
    }

    pub fn first_input(&self) -> Option<&OutPoint> {
        self.inputs.first().map(|input| &input.out_point)
    }

    /// Packed view, used for size and hash
    pub fn to_view(&self) -> core::TransactionView {
        core::TransactionBuilder::default()
            .cell_deps(self.cell_deps.iter().map(CellDep::to_packed))
            .inputs(self.inputs.iter().map(|input| input.out_point.to_cell_input()))
            .outputs(self.outputs.iter().map(CellOutput::to_packed))
            .outputs_data(self.outputs_data.iter().map(|data| data.as_slice().pack()))
            .witnesses(self.witnesses.iter().map(|w| w.as_slice().pack()))
            .build()
    }

    /// Size the transaction occupies in a block
    pub fn serialized_size(&self) -> u64 {
        self.to_view().data().as_reader().serialized_size_in_block() as u64
    }

    pub fn fee(&self, fee_rate: u64) -> u64 {
        fee_for_size(self.serialized_size(), fee_rate)
    }

    pub fn tx_hash(&self) -> H256 {
        self.to_view().hash().unpack()
    }

    /// Every output must hold at least the capacity it occupies
    pub fn verify_occupancy(&self) -> ForgeResult<()> {
        for (index, (output, data)) in self.outputs.iter().zip(&self.outputs_data).enumerate() {
            let occupied = output.occupied_capacity(data.len());
            if output.capacity < occupied {
                return Err(ForgeError::OccupancyViolation {
                    index,
                    capacity: output.capacity,
                    occupied,
                });
            }
        }
        Ok(())
    }

    /// `inputs == outputs + fee` at `fee_rate`
    pub fn verify_balance(&self, fee_rate: u64) -> ForgeResult<()> {
        let inputs = self.input_capacity()?;
        let outputs = self.output_capacity()?;
        let fee = self.fee(fee_rate);
        if inputs != add_capacity(outputs, fee)? {
            return Err(ForgeError::internal(format!(
                "unbalanced skeleton: inputs {inputs}, outputs {outputs}, fee {fee}"
            )));
        }
        Ok(())
    }
}

mod hex_vec {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(|item| crate::codec::to_hex(item)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|item| crate::codec::parse_hex(item).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Script, ScriptHashType, ONE_CKB};

    fn lock() -> Script {
        Script::new(H256([0x9b; 32]), ScriptHashType::Type, vec![1u8; 20])
    }

    fn input(byte: u8, capacity: u64) -> SkeletonInput {
        SkeletonInput::new(OutPoint::new(H256([byte; 32]), 0), capacity, InputSource::Supplied)
    }

    #[test]
    fn test_fee_rounds_up() {
        assert_eq!(fee_for_size(1000, 1000), 1000);
        assert_eq!(fee_for_size(1001, 1000), 1001);
        assert_eq!(fee_for_size(1, 1), 1);
        assert_eq!(fee_for_size(0, 1000), 0);
    }

    #[test]
    fn test_placeholder_witness_shape() {
        let witness = placeholder_witness();
        // table header (16) + BytesOpt(Some(65 bytes)) (4 + 65)
        assert_eq!(witness.len(), 16 + 4 + 65);
        assert!(packed::WitnessArgs::from_slice(&witness).is_ok());
    }

    #[test]
    fn test_witnesses_follow_inputs() {
        let skeleton = TransactionSkeleton::new()
            .with_input(input(1, 100))
            .with_input(input(2, 100));
        assert_eq!(skeleton.witnesses.len(), 2);
        assert_eq!(skeleton.witnesses[0], placeholder_witness());
        assert!(skeleton.witnesses[1].is_empty());
    }

    #[test]
    fn test_mutation_returns_new_value() {
        let base = TransactionSkeleton::new().with_input(input(1, 500 * ONE_CKB));
        let extended = base.clone().with_output(CellOutput::new(61 * ONE_CKB, lock(), None), vec![]);
        assert!(base.outputs.is_empty());
        assert_eq!(extended.outputs.len(), 1);
        assert!(extended.serialized_size() > base.serialized_size());
    }

    #[test]
    fn test_occupancy_check_reports_index() {
        let skeleton = TransactionSkeleton::new()
            .with_output(CellOutput::new(61 * ONE_CKB, lock(), None), vec![])
            .with_output(CellOutput::new(61 * ONE_CKB, lock(), None), vec![0u8; 1]);
        match skeleton.verify_occupancy() {
            Err(ForgeError::OccupancyViolation { index, occupied, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(occupied, 62 * ONE_CKB);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_type_id_depends_on_input_and_index() {
        let a = OutPoint::new(H256([1; 32]), 0);
        let b = OutPoint::new(H256([1; 32]), 1);
        assert_ne!(type_id_args(&a, 0), type_id_args(&b, 0));
        assert_ne!(type_id_args(&a, 0), type_id_args(&a, 1));
        assert_eq!(type_id_args(&a, 0), type_id_args(&a, 0));
    }

    #[test]
    fn test_serde_round_trip_keeps_hex_data() {
        let skeleton = TransactionSkeleton::new()
            .with_input(input(3, 100))
            .with_output(CellOutput::new(100, lock(), None), vec![0xab, 0xcd]);
        let json = serde_json::to_value(&skeleton).unwrap();
        assert_eq!(json["outputs_data"][0], "0xabcd");
        let back: TransactionSkeleton = serde_json::from_value(json).unwrap();
        assert_eq!(back, skeleton);
    }
}
