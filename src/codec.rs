//! Hex parsing, serde helpers and the molecule tables stored in cell data

use ckb_types::{packed, prelude::*, H256};
use serde_json::Value;

use crate::errors::{ForgeError, ForgeResult};
use crate::schemas::{ClusterData, SporeData};

/// Content type of every DOB/0 spore produced by this crate
pub const DOB0_CONTENT_TYPE: &str = "dob/0";

/// Decode a `0x`-prefixed (or bare) hex string.
///
/// Odd-length input is left-padded with a zero nibble, so `0x7` decodes to
/// `[0x07]`.
pub fn parse_hex(input: &str) -> ForgeResult<Vec<u8>> {
    let raw = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let padded;
    let even = if raw.len() % 2 == 1 {
        padded = format!("0{raw}");
        padded.as_str()
    } else {
        raw
    };
    hex::decode(even).map_err(|e| ForgeError::malformed(format!("invalid hex '{input}': {e}")))
}

/// Decode a 32-byte hash, rejecting any other length
pub fn parse_h256(input: &str) -> ForgeResult<H256> {
    let bytes = parse_hex(input)?;
    let array: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        ForgeError::malformed(format!("expected 32-byte hash, got {} bytes in '{input}'", b.len()))
    })?;
    Ok(H256(array))
}

/// `0x`-prefixed lowercase hex
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn h256_hex(hash: &H256) -> String {
    to_hex(&hash.0)
}

/// Parse a `u64` that may be a JSON number, a decimal string or a `0x` string
pub fn parse_u64_value(value: &Value) -> ForgeResult<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ForgeError::malformed(format!("expected unsigned integer, got {n}"))),
        Value::String(s) => parse_u64_str(s),
        other => Err(ForgeError::malformed(format!(
            "expected integer or string, got {other}"
        ))),
    }
}

pub fn parse_u64_str(s: &str) -> ForgeResult<u64> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| ForgeError::malformed(format!("invalid integer '{s}': {e}")))
}

/// Serde adapter for `Vec<u8>` as `0x` hex
pub mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_hex(&s).map_err(D::Error::custom)
    }
}

/// Serde adapter for `u64` as `0x` hex, the node's wire format for numbers
pub mod hex_u64 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_u64_str(&s).map_err(D::Error::custom)
    }
}

/// `SporeData { content_type: Bytes, content: Bytes, cluster_id: BytesOpt }`
pub fn pack_spore_data(content_type: &str, content: &[u8], cluster_id: Option<&[u8]>) -> Vec<u8> {
    let cluster_id = packed::BytesOpt::new_builder()
        .set(cluster_id.map(|id| id.pack()))
        .build();
    SporeData::new_builder()
        .content_type(content_type.as_bytes().pack())
        .content(content.pack())
        .cluster_id(cluster_id)
        .build()
        .as_bytes()
        .to_vec()
}

/// `ClusterData { name: Bytes, description: Bytes }`
pub fn pack_cluster_data(name: &str, description: &str) -> Vec<u8> {
    ClusterData::new_builder()
        .name(name.as_bytes().pack())
        .description(description.as_bytes().pack())
        .build()
        .as_bytes()
        .to_vec()
}
