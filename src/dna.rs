//! Deterministic payload derivation
//!
//! A spore's DNA binds a recipient to an external reference height and a token
//! id. All functions here are pure: no randomness, no clock, so a payload can
//! be re-derived and verified at any time.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::{self, pack_spore_data, parse_hex, DOB0_CONTENT_TYPE};
use crate::errors::{ForgeError, ForgeResult};

/// Hex characters kept from the DNA digest (16 bytes)
pub const DNA_HEX_LEN: usize = 32;

/// Hex characters kept from the gear-id digest (8 bytes)
pub const GEAR_ID_HEX_LEN: usize = 16;

/// Big-endian encoding without leading zero bytes; zero encodes as `[0x00]`
pub fn minimal_be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

/// 16-byte identifier, kept as the 32-character hex string it is stored as
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dna(String);

impl Dna {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        // Always 32 lowercase hex characters by construction
        if let Ok(bytes) = hex::decode(&self.0) {
            out.copy_from_slice(&bytes);
        }
        out
    }
}

impl std::fmt::Display for Dna {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// DNA of `token_id` minted to `address` under the cluster anchored at `reference_height`
pub fn derive_dna(reference_height: u64, token_id: u64, address: &str) -> Dna {
    let mut hasher = Sha256::new();
    hasher.update(minimal_be_bytes(reference_height));
    hasher.update(minimal_be_bytes(token_id));
    hasher.update(address.as_bytes());
    let digest = hex::encode(hasher.finalize());
    Dna(digest[..DNA_HEX_LEN].to_string())
}

/// 8-byte gear id of the `sequence`-th (1-based) item for `address` in a cluster
pub fn gear_id(cluster_id: &str, sequence: u64, address: &str) -> ForgeResult<[u8; 8]> {
    let cluster_bytes = parse_hex(cluster_id)?;
    let mut hasher = Sha256::new();
    hasher.update(&cluster_bytes);
    hasher.update(minimal_be_bytes(sequence));
    hasher.update(address.as_bytes());
    let digest = hasher.finalize();

    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..GEAR_ID_HEX_LEN / 2]);
    Ok(out)
}

/// Visual traits a forged record is rendered with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSpec {
    /// Background reference, stored as UTF-8
    pub bg: String,
    /// View index
    pub view: u64,
}

/// Payload of a record cell before it is packed into cell data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedPayload {
    /// Hex identifier the content was derived from (DNA or gear id)
    pub identifier: String,
    pub content_type: String,
    #[serde(with = "codec::hex_bytes")]
    pub raw_content: Vec<u8>,
    #[serde(with = "codec::hex_bytes")]
    pub cluster_id: Vec<u8>,
}

impl DerivedPayload {
    /// Molecule `SporeData` stored in the record cell
    pub fn to_cell_data(&self) -> Vec<u8> {
        let cluster = (!self.cluster_id.is_empty()).then_some(self.cluster_id.as_slice());
        pack_spore_data(&self.content_type, &self.raw_content, cluster)
    }
}

fn cluster_bytes(cluster_id: &str) -> ForgeResult<Vec<u8>> {
    let bytes = parse_hex(cluster_id)?;
    if bytes.len() != 32 {
        return Err(ForgeError::malformed(format!(
            "cluster id must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Content of a forged record: `"<hex(bg ‖ view ‖ gear id)>"`
pub fn forge_payload(
    cluster_id: &str,
    sequence: u64,
    address: &str,
    spec: &PayloadSpec,
) -> ForgeResult<DerivedPayload> {
    let cluster = cluster_bytes(cluster_id)?;
    let gear = gear_id(cluster_id, sequence, address)?;

    let mut blob = Vec::with_capacity(spec.bg.len() + 16);
    blob.extend_from_slice(spec.bg.as_bytes());
    blob.extend_from_slice(&minimal_be_bytes(spec.view));
    blob.extend_from_slice(&gear);
    let content = format!("\"{}\"", hex::encode(&blob));

    Ok(DerivedPayload {
        identifier: hex::encode(gear),
        content_type: DOB0_CONTENT_TYPE.to_string(),
        raw_content: content.into_bytes(),
        cluster_id: cluster,
    })
}

/// Content of a batch-minted record: `{"id": token_id, "dna": "<32 hex>"}`
pub fn mint_payload(
    cluster_id: &str,
    reference_height: u64,
    token_id: u64,
    address: &str,
) -> ForgeResult<DerivedPayload> {
    let cluster = cluster_bytes(cluster_id)?;
    let dna = derive_dna(reference_height, token_id, address);
    let content = serde_json::to_vec(&serde_json::json!({
        "id": token_id,
        "dna": dna.as_str(),
    }))
    .map_err(|e| ForgeError::internal(format!("content encoding failed: {e}")))?;

    Ok(DerivedPayload {
        identifier: dna.0,
        content_type: DOB0_CONTENT_TYPE.to_string(),
        raw_content: content,
        cluster_id: cluster,
    })
}
