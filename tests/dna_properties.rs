//! Property tests for deterministic payload derivation

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use spore_forge::dna::{derive_dna, gear_id, minimal_be_bytes, mint_payload, DNA_HEX_LEN};

    const CLUSTER: &str = "0x7366e4c2b6ed9b1a1f4ffb2d06ef2fe5a8bda6e81f83db35c2436a5d5a3e8b6c";

    #[test]
    fn test_repeated_derivation_is_identical() {
        let first = derive_dna(840_000, 7, "addr1");
        let second = derive_dna(840_000, 7, "addr1");
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), DNA_HEX_LEN);
        assert_ne!(first, derive_dna(840_000, 8, "addr1"));
    }

    proptest! {
        #[test]
        fn dna_is_pure_and_lowercase_hex(height in any::<u64>(), token in any::<u64>(), address in "[a-z0-9]{1,64}") {
            let dna = derive_dna(height, token, &address);
            let again = derive_dna(height, token, &address);
            prop_assert_eq!(&dna, &again);
            prop_assert_eq!(dna.as_str().len(), DNA_HEX_LEN);
            prop_assert!(dna.as_str().chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            prop_assert_eq!(hex::encode(dna.to_bytes()), dna.as_str());
        }

        #[test]
        fn distinct_tokens_give_distinct_dna(height in any::<u64>(), token in 0u64..u64::MAX, address in "[a-z0-9]{1,64}") {
            let this = derive_dna(height, token, &address);
            let next = derive_dna(height, token + 1, &address);
            prop_assert_ne!(this, next);
        }

        #[test]
        fn minimal_bytes_round_trip(value in any::<u64>()) {
            let bytes = minimal_be_bytes(value);
            prop_assert!(!bytes.is_empty() && bytes.len() <= 8);
            prop_assert!(bytes.len() == 1 || bytes[0] != 0);
            let mut padded = [0u8; 8];
            padded[8 - bytes.len()..].copy_from_slice(&bytes);
            prop_assert_eq!(u64::from_be_bytes(padded), value);
        }

        #[test]
        fn gear_id_depends_on_sequence(sequence in 1u64..1_000_000, address in "[a-z0-9]{8,40}") {
            let a = gear_id(CLUSTER, sequence, &address).unwrap();
            let again = gear_id(CLUSTER, sequence, &address).unwrap();
            let next = gear_id(CLUSTER, sequence + 1, &address).unwrap();
            prop_assert_eq!(a, again);
            prop_assert_ne!(a, next);
        }

        #[test]
        fn mint_content_embeds_dna(height in any::<u64>(), token in any::<u64>(), address in "[a-z0-9]{1,64}") {
            let payload = mint_payload(CLUSTER, height, token, &address).unwrap();
            let content: serde_json::Value = serde_json::from_slice(&payload.raw_content).unwrap();
            prop_assert_eq!(content["id"].as_u64(), Some(token));
            let dna = derive_dna(height, token, &address);
            prop_assert_eq!(content["dna"].as_str(), Some(dna.as_str()));
            prop_assert_eq!(payload.identifier, dna.as_str().to_string());
        }
    }

    #[test]
    fn test_malformed_cluster_id_is_rejected() {
        assert!(mint_payload("0x1234", 1, 1, "addr1").is_err());
        assert!(mint_payload("not-hex", 1, 1, "addr1").is_err());
    }
}
