//! Common cell-model types used throughout the crate

use ckb_types::{packed, prelude::*, H256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::codec::{self, parse_h256, parse_u64_value};
use crate::errors::{ForgeError, ForgeResult};

/// Shannons per CKB
pub const ONE_CKB: u64 = 100_000_000;

/// Bytes a cell spends on its own capacity field
pub const CAPACITY_FIELD_BYTES: u64 = 8;

/// Format shannons as a CKB amount, e.g. `61.00000000`
pub fn format_ckb(shannons: u64) -> String {
    format!("{}.{:08}", shannons / ONE_CKB, shannons % ONE_CKB)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptHashType {
    Data,
    Type,
    Data1,
    Data2,
}

impl ScriptHashType {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Data => 0,
            Self::Type => 1,
            Self::Data1 => 2,
            Self::Data2 => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Data),
            1 => Some(Self::Type),
            2 => Some(Self::Data1),
            4 => Some(Self::Data2),
            _ => None,
        }
    }
}

/// Lock or type script
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script {
    pub code_hash: H256,
    pub hash_type: ScriptHashType,
    #[serde(with = "codec::hex_bytes")]
    pub args: Vec<u8>,
}

impl Script {
    pub fn new(code_hash: H256, hash_type: ScriptHashType, args: Vec<u8>) -> Self {
        Self {
            code_hash,
            hash_type,
            args,
        }
    }

    /// Code hash, hash type and args
    pub fn occupied_bytes(&self) -> u64 {
        32 + 1 + self.args.len() as u64
    }

    pub fn with_args(&self, args: Vec<u8>) -> Self {
        Self {
            args,
            ..self.clone()
        }
    }

    pub fn to_packed(&self) -> packed::Script {
        packed::Script::new_builder()
            .code_hash(self.code_hash.pack())
            .hash_type(packed::Byte::new(self.hash_type.as_byte()))
            .args(self.args.as_slice().pack())
            .build()
    }
}

/// Reference to a transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: H256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: H256, index: u32) -> Self {
        Self { tx_hash, index }
    }

    pub fn to_packed(&self) -> packed::OutPoint {
        packed::OutPoint::new_builder()
            .tx_hash(self.tx_hash.pack())
            .index(self.index.pack())
            .build()
    }

    /// Input spending this out point with no `since` restriction
    pub fn to_cell_input(&self) -> packed::CellInput {
        packed::CellInput::new_builder()
            .previous_output(self.to_packed())
            .since(0u64.pack())
            .build()
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", codec::h256_hex(&self.tx_hash), self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    pub capacity: u64,
    pub lock: Script,
    #[serde(rename = "type")]
    pub type_: Option<Script>,
}

impl CellOutput {
    pub fn new(capacity: u64, lock: Script, type_: Option<Script>) -> Self {
        Self {
            capacity,
            lock,
            type_,
        }
    }

    /// Bytes this output occupies when carrying `data_len` bytes of data
    pub fn occupied_bytes(&self, data_len: usize) -> u64 {
        CAPACITY_FIELD_BYTES
            + self.lock.occupied_bytes()
            + self.type_.as_ref().map_or(0, Script::occupied_bytes)
            + data_len as u64
    }

    /// Minimum capacity in shannons for `data_len` bytes of data
    pub fn occupied_capacity(&self, data_len: usize) -> u64 {
        self.occupied_bytes(data_len) * ONE_CKB
    }

    pub fn with_capacity(&self, capacity: u64) -> Self {
        Self {
            capacity,
            ..self.clone()
        }
    }

    pub fn is_plain(&self) -> bool {
        self.type_.is_none()
    }

    pub fn to_packed(&self) -> packed::CellOutput {
        packed::CellOutput::new_builder()
            .capacity(self.capacity.pack())
            .lock(self.lock.to_packed())
            .type_(self.type_.as_ref().map(Script::to_packed).pack())
            .build()
    }
}

/// A live cell: out point, output and data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCell {
    pub out_point: OutPoint,
    pub output: CellOutput,
    #[serde(with = "codec::hex_bytes")]
    pub data: Vec<u8>,
}

impl LiveCell {
    pub fn capacity(&self) -> u64 {
        self.output.capacity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepType {
    Code,
    DepGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDep {
    pub out_point: OutPoint,
    pub dep_type: DepType,
}

impl CellDep {
    pub fn to_packed(&self) -> packed::CellDep {
        let dep_type = match self.dep_type {
            DepType::Code => 0u8,
            DepType::DepGroup => 1u8,
        };
        packed::CellDep::new_builder()
            .out_point(self.out_point.to_packed())
            .dep_type(packed::Byte::new(dep_type))
            .build()
    }
}

/// Kind of caller-supplied material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialKind {
    /// Existing spore cell, melted by the transaction
    #[serde(rename = "Spore")]
    RecordCell,
    /// Plain capacity cell
    #[serde(rename = "Ckb")]
    ValueCell,
}

/// Caller-supplied input reference
///
/// Deserializes from the request shape
/// `{"type": "Spore" | "Ckb", "tx_hash": "0x..", "index": "0x1" | 1, "amount": 100}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMaterial")]
pub struct Material {
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    #[serde(flatten)]
    pub out_point: OutPoint,
    /// Capacity in shannons, when the caller knows it
    pub amount: Option<u64>,
}

impl Material {
    pub fn record(out_point: OutPoint, amount: Option<u64>) -> Self {
        Self {
            kind: MaterialKind::RecordCell,
            out_point,
            amount,
        }
    }

    pub fn value(out_point: OutPoint, amount: u64) -> Self {
        Self {
            kind: MaterialKind::ValueCell,
            out_point,
            amount: Some(amount),
        }
    }
}

#[derive(Deserialize)]
struct RawMaterial {
    #[serde(rename = "type")]
    kind: String,
    tx_hash: String,
    index: Value,
    #[serde(default)]
    amount: Option<Value>,
}

impl TryFrom<RawMaterial> for Material {
    type Error = ForgeError;

    fn try_from(raw: RawMaterial) -> ForgeResult<Self> {
        let kind = match raw.kind.as_str() {
            "Spore" => MaterialKind::RecordCell,
            "Ckb" => MaterialKind::ValueCell,
            other => {
                return Err(ForgeError::malformed(format!(
                    "unknown material type '{other}'"
                )))
            }
        };
        let index = parse_u64_value(&raw.index)?;
        let index = u32::try_from(index)
            .map_err(|_| ForgeError::malformed(format!("output index {index} out of range")))?;
        let amount = raw.amount.as_ref().map(parse_u64_value).transpose()?;

        Ok(Self {
            kind,
            out_point: OutPoint::new(parse_h256(&raw.tx_hash)?, index),
            amount,
        })
    }
}
