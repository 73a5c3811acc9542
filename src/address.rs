//! CKB address decoding
//!
//! Supports the full format (`0x00`, bech32m), the deprecated full formats
//! (`0x02` data / `0x04` type, bech32) and the short format (`0x01`, bech32)
//! for the secp256k1-blake160 and multisig locks.

use bech32::{FromBase32, ToBase32, Variant};
use ckb_types::H256;
use serde::{Deserialize, Serialize};

use crate::errors::{ForgeError, ForgeResult};
use crate::types::{Script, ScriptHashType};

const FORMAT_FULL: u8 = 0x00;
const FORMAT_SHORT: u8 = 0x01;
const FORMAT_FULL_DATA: u8 = 0x02;
const FORMAT_FULL_TYPE: u8 = 0x04;

/// secp256k1-blake160 sighash-all lock
pub const SECP256K1_BLAKE160_CODE_HASH: [u8; 32] = [
    0x9b, 0xd7, 0xe0, 0x6f, 0x3e, 0xcf, 0x4b, 0xe0, 0xf2, 0xfc, 0xd2, 0x18, 0x8b, 0x23, 0xf1, 0xb9,
    0xfc, 0xc8, 0x8e, 0x5d, 0x4b, 0x65, 0xa8, 0x63, 0x7b, 0x17, 0x72, 0x3b, 0xbd, 0xa3, 0xcc, 0xe8,
];

/// secp256k1-blake160 multisig-all lock
pub const SECP256K1_MULTISIG_CODE_HASH: [u8; 32] = [
    0x5c, 0x50, 0x69, 0xeb, 0x08, 0x57, 0xef, 0xc6, 0x5e, 0x1b, 0xca, 0x0c, 0x07, 0xdf, 0x34, 0xc3,
    0x16, 0x63, 0xb3, 0x62, 0x2f, 0xd3, 0x87, 0x6c, 0x87, 0x63, 0x20, 0xfc, 0x96, 0x34, 0xe2, 0xa8,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn hrp(self) -> &'static str {
        match self {
            Self::Mainnet => "ckb",
            Self::Testnet => "ckt",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = ForgeError;

    fn from_str(s: &str) -> ForgeResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "lina" => Ok(Self::Mainnet),
            "testnet" | "aggron" | "aggron4" => Ok(Self::Testnet),
            other => Err(ForgeError::malformed(format!("unknown network '{other}'"))),
        }
    }
}

/// Recipient of a record: the address as given and the lock decoded from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    pub lock: Script,
}

impl Recipient {
    pub fn parse(address: &str, network: Network) -> ForgeResult<Self> {
        Ok(Self {
            address: address.to_string(),
            lock: parse_address(address, network)?,
        })
    }
}

/// Decode `address` into its lock script, checking the network prefix
pub fn parse_address(address: &str, network: Network) -> ForgeResult<Script> {
    let (hrp, data, variant) = bech32::decode(address)
        .map_err(|e| ForgeError::malformed(format!("invalid address '{address}': {e}")))?;
    if hrp != network.hrp() {
        return Err(ForgeError::malformed(format!(
            "address '{address}' has prefix '{hrp}', expected '{}'",
            network.hrp()
        )));
    }
    let payload = Vec::<u8>::from_base32(&data)
        .map_err(|e| ForgeError::malformed(format!("invalid address payload: {e}")))?;
    let (&format, body) = payload
        .split_first()
        .ok_or_else(|| ForgeError::malformed("empty address payload"))?;

    let expected_variant = if format == FORMAT_FULL {
        Variant::Bech32m
    } else {
        Variant::Bech32
    };
    if variant != expected_variant {
        return Err(ForgeError::malformed(format!(
            "address format {format:#04x} encoded with the wrong checksum variant"
        )));
    }

    match format {
        FORMAT_FULL => {
            if body.len() < 33 {
                return Err(ForgeError::malformed("full address payload too short"));
            }
            let hash_type = ScriptHashType::from_byte(body[32])
                .ok_or_else(|| ForgeError::malformed(format!("unknown hash type {}", body[32])))?;
            Ok(Script::new(code_hash(&body[..32])?, hash_type, body[33..].to_vec()))
        }
        FORMAT_SHORT => {
            if body.len() != 21 {
                return Err(ForgeError::malformed("short address must carry 20-byte args"));
            }
            let code_hash = match body[0] {
                0x00 => SECP256K1_BLAKE160_CODE_HASH,
                0x01 => SECP256K1_MULTISIG_CODE_HASH,
                other => {
                    return Err(ForgeError::malformed(format!(
                        "unsupported short address code hash index {other}"
                    )))
                }
            };
            Ok(Script::new(H256(code_hash), ScriptHashType::Type, body[1..].to_vec()))
        }
        FORMAT_FULL_DATA | FORMAT_FULL_TYPE => {
            if body.len() < 32 {
                return Err(ForgeError::malformed("full address payload too short"));
            }
            let hash_type = if format == FORMAT_FULL_DATA {
                ScriptHashType::Data
            } else {
                ScriptHashType::Type
            };
            Ok(Script::new(code_hash(&body[..32])?, hash_type, body[32..].to_vec()))
        }
        other => Err(ForgeError::malformed(format!(
            "unsupported address format {other:#04x}"
        ))),
    }
}

/// Encode `lock` as a full-format (bech32m) address
pub fn encode_full_address(lock: &Script, network: Network) -> ForgeResult<String> {
    let mut payload = Vec::with_capacity(34 + lock.args.len());
    payload.push(FORMAT_FULL);
    payload.extend_from_slice(&lock.code_hash.0);
    payload.push(lock.hash_type.as_byte());
    payload.extend_from_slice(&lock.args);
    bech32::encode(network.hrp(), payload.to_base32(), Variant::Bech32m)
        .map_err(|e| ForgeError::internal(format!("address encoding failed: {e}")))
}

fn code_hash(bytes: &[u8]) -> ForgeResult<H256> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ForgeError::malformed("code hash must be 32 bytes"))?;
    Ok(H256(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lock() -> Script {
        Script::new(
            H256(SECP256K1_BLAKE160_CODE_HASH),
            ScriptHashType::Type,
            vec![0x36, 0xc3, 0x29, 0xed, 0x63, 0x0d, 0x6c, 0xe7, 0x50, 0x71, 0x2a, 0x47, 0x75, 0x43, 0x67, 0x2a, 0xda, 0xb5, 0x7f, 0x4c],
        )
    }

    #[test]
    fn test_full_address_round_trip() {
        let lock = sample_lock();
        let address = encode_full_address(&lock, Network::Testnet).unwrap();
        assert!(address.starts_with("ckt1"));
        assert_eq!(parse_address(&address, Network::Testnet).unwrap(), lock);
    }

    #[test]
    fn test_short_address_decodes_to_secp_lock() {
        let mut payload = vec![FORMAT_SHORT, 0x00];
        payload.extend_from_slice(&sample_lock().args);
        let address = bech32::encode("ckb", payload.to_base32(), Variant::Bech32).unwrap();
        assert_eq!(parse_address(&address, Network::Mainnet).unwrap(), sample_lock());
    }

    #[test]
    fn test_network_prefix_mismatch_is_malformed() {
        let address = encode_full_address(&sample_lock(), Network::Mainnet).unwrap();
        let err = parse_address(&address, Network::Testnet).unwrap_err();
        assert!(matches!(err, ForgeError::MalformedInput(_)));
    }

    #[test]
    fn test_garbage_address_is_malformed() {
        assert!(matches!(
            parse_address("addr1", Network::Testnet),
            Err(ForgeError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_wrong_checksum_variant_rejected() {
        let lock = sample_lock();
        let mut payload = vec![FORMAT_FULL];
        payload.extend_from_slice(&lock.code_hash.0);
        payload.push(lock.hash_type.as_byte());
        payload.extend_from_slice(&lock.args);
        let address = bech32::encode("ckt", payload.to_base32(), Variant::Bech32).unwrap();
        assert!(parse_address(&address, Network::Testnet).is_err());
    }
}
