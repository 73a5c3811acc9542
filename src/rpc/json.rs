//! JSON-RPC wire shapes of the CKB node and indexer
//!
//! Numbers travel as `0x` hex strings; these types convert to and from the
//! crate's own cell types at the boundary.

use ckb_types::H256;
use serde::{Deserialize, Serialize};

use crate::codec::{hex_bytes, hex_u64};
use crate::tx_builder::skeleton::TransactionSkeleton;
use crate::types::{CellDep, CellOutput, DepType, LiveCell, OutPoint, Script};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonOutPoint {
    pub tx_hash: H256,
    #[serde(with = "hex_u64")]
    pub index: u64,
}

impl From<&OutPoint> for JsonOutPoint {
    fn from(out_point: &OutPoint) -> Self {
        Self {
            tx_hash: out_point.tx_hash.clone(),
            index: u64::from(out_point.index),
        }
    }
}

impl JsonOutPoint {
    pub fn into_out_point(self) -> Result<OutPoint, String> {
        let index = u32::try_from(self.index).map_err(|_| format!("index {} out of range", self.index))?;
        Ok(OutPoint::new(self.tx_hash, index))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonCellOutput {
    #[serde(with = "hex_u64")]
    pub capacity: u64,
    pub lock: Script,
    #[serde(rename = "type", default)]
    pub type_: Option<Script>,
}

impl From<&CellOutput> for JsonCellOutput {
    fn from(output: &CellOutput) -> Self {
        Self {
            capacity: output.capacity,
            lock: output.lock.clone(),
            type_: output.type_.clone(),
        }
    }
}

impl From<JsonCellOutput> for CellOutput {
    fn from(output: JsonCellOutput) -> Self {
        CellOutput::new(output.capacity, output.lock, output.type_)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCellDep {
    pub out_point: JsonOutPoint,
    pub dep_type: DepType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCellInput {
    pub previous_output: JsonOutPoint,
    #[serde(with = "hex_u64")]
    pub since: u64,
}

/// Transaction as `send_transaction` expects it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonTransaction {
    #[serde(with = "hex_u64")]
    pub version: u64,
    pub cell_deps: Vec<JsonCellDep>,
    pub header_deps: Vec<H256>,
    pub inputs: Vec<JsonCellInput>,
    pub outputs: Vec<JsonCellOutput>,
    pub outputs_data: Vec<JsonBytes>,
    pub witnesses: Vec<JsonBytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonBytes(#[serde(with = "hex_bytes")] pub Vec<u8>);

impl From<&TransactionSkeleton> for JsonTransaction {
    fn from(skeleton: &TransactionSkeleton) -> Self {
        Self {
            version: 0,
            cell_deps: skeleton.cell_deps.iter().map(json_cell_dep).collect(),
            header_deps: Vec::new(),
            inputs: skeleton
                .inputs
                .iter()
                .map(|input| JsonCellInput {
                    previous_output: JsonOutPoint::from(&input.out_point),
                    since: 0,
                })
                .collect(),
            outputs: skeleton.outputs.iter().map(JsonCellOutput::from).collect(),
            outputs_data: skeleton.outputs_data.iter().cloned().map(JsonBytes).collect(),
            witnesses: skeleton.witnesses.iter().cloned().map(JsonBytes).collect(),
        }
    }
}

fn json_cell_dep(dep: &CellDep) -> JsonCellDep {
    JsonCellDep {
        out_point: JsonOutPoint::from(&dep.out_point),
        dep_type: dep.dep_type,
    }
}

/// `get_transaction` result
#[derive(Debug, Clone, Deserialize)]
pub struct JsonTransactionWithStatus {
    pub tx_status: JsonTxStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonTxStatus {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `get_live_cell` result
#[derive(Debug, Clone, Deserialize)]
pub struct JsonCellWithStatus {
    pub cell: Option<JsonCellInfo>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonCellInfo {
    pub output: JsonCellOutput,
    #[serde(default)]
    pub data: Option<JsonCellData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonCellData {
    pub content: JsonBytes,
}

/// Indexer `get_cells` search key
#[derive(Debug, Clone, Serialize)]
pub struct SearchKey {
    pub script: Script,
    pub script_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<SearchFilter>,
    pub with_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchFilter {
    /// Length range of the other script, `[0, 1)` meaning absent
    pub script_len_range: [JsonU64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonU64(#[serde(with = "hex_u64")] pub u64);

/// Indexer `get_cells` page
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerPage {
    pub objects: Vec<IndexerCell>,
    pub last_cursor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerCell {
    pub output: JsonCellOutput,
    #[serde(default)]
    pub output_data: Option<JsonBytes>,
    pub out_point: JsonOutPoint,
}

impl IndexerCell {
    pub fn into_live_cell(self) -> Result<LiveCell, String> {
        Ok(LiveCell {
            out_point: self.out_point.into_out_point()?,
            output: self.output.into(),
            data: self.output_data.map(|d| d.0).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::skeleton::{InputSource, SkeletonInput};
    use crate::types::{ScriptHashType, ONE_CKB};

    #[test]
    fn test_transaction_json_uses_hex_numbers() {
        let lock = Script::new(H256([0x9b; 32]), ScriptHashType::Type, vec![1u8; 20]);
        let skeleton = TransactionSkeleton::new()
            .with_input(SkeletonInput::new(
                OutPoint::new(H256([2; 32]), 3),
                100 * ONE_CKB,
                InputSource::Supplied,
            ))
            .with_output(CellOutput::new(99 * ONE_CKB, lock, None), vec![]);

        let json = serde_json::to_value(JsonTransaction::from(&skeleton)).unwrap();
        assert_eq!(json["version"], "0x0");
        assert_eq!(json["inputs"][0]["previous_output"]["index"], "0x3");
        assert_eq!(json["inputs"][0]["since"], "0x0");
        assert_eq!(json["outputs"][0]["capacity"], "0x24e160300");
        assert_eq!(json["outputs"][0]["type"], serde_json::Value::Null);
        assert_eq!(json["outputs"][0]["lock"]["hash_type"], "type");
        assert_eq!(json["outputs_data"][0], "0x");
    }

    #[test]
    fn test_indexer_cell_decodes() {
        let json = serde_json::json!({
            "output": {
                "capacity": "0x174876e800",
                "lock": {
                    "code_hash": format!("0x{}", "9b".repeat(32)),
                    "hash_type": "type",
                    "args": "0x0102"
                },
                "type": null
            },
            "output_data": "0x",
            "out_point": {"tx_hash": format!("0x{}", "11".repeat(32)), "index": "0x1"},
            "block_number": "0x10",
            "tx_index": "0x0"
        });
        let cell: IndexerCell = serde_json::from_value(json).unwrap();
        let live = cell.into_live_cell().unwrap();
        assert_eq!(live.capacity(), 1000 * ONE_CKB);
        assert_eq!(live.out_point.index, 1);
        assert!(live.output.is_plain());
    }
}
