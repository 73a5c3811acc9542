//! Cluster cell assembly
//!
//! A cluster is minted once per collection. Its id is the type id of the
//! minting transaction's first input, so like a record it is filled in after
//! balancing.

use ckb_types::H256;
use serde::{Deserialize, Serialize};

use crate::codec::pack_cluster_data;
use crate::config::ScriptsConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::tx_builder::record::DEFAULT_CAPACITY_MARGIN;
use crate::tx_builder::skeleton::{type_id_args, TransactionSkeleton};
use crate::types::{CellOutput, Script};

pub const CLUSTER_OUTPUT_INDEX: usize = 0;

/// Cluster metadata as read from `cluster-<no>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    /// Free-form description; stored on chain as its JSON text
    pub description: serde_json::Value,
}

impl ClusterSpec {
    pub fn description_text(&self) -> ForgeResult<String> {
        match &self.description {
            serde_json::Value::String(text) => Ok(text.clone()),
            other => serde_json::to_string(other)
                .map_err(|e| ForgeError::internal(format!("description encoding failed: {e}"))),
        }
    }

    pub fn to_cell_data(&self) -> ForgeResult<Vec<u8>> {
        Ok(pack_cluster_data(&self.name, &self.description_text()?))
    }
}

#[derive(Debug, Clone)]
pub struct ClusterTxBuilder {
    scripts: ScriptsConfig,
}

impl ClusterTxBuilder {
    pub fn new(scripts: ScriptsConfig) -> Self {
        Self { scripts }
    }

    /// Unbalanced skeleton with the cluster cell as its only output
    pub fn assemble(&self, spec: &ClusterSpec, owner: &Script) -> ForgeResult<TransactionSkeleton> {
        let data = spec.to_cell_data()?;
        let type_script = self.scripts.cluster.script(vec![0u8; 32]);
        let template = CellOutput::new(0, owner.clone(), Some(type_script));
        let capacity = template.occupied_capacity(data.len()) + DEFAULT_CAPACITY_MARGIN;

        Ok(TransactionSkeleton::new()
            .with_cell_dep(self.scripts.cluster.cell_dep.clone())
            .with_cell_dep(self.scripts.secp256k1.clone())
            .with_output(template.with_capacity(capacity), data))
    }

    /// Fill the cluster id from the balanced skeleton's first input
    pub fn finalize(&self, skeleton: TransactionSkeleton) -> ForgeResult<(TransactionSkeleton, H256)> {
        let first = skeleton
            .first_input()
            .cloned()
            .ok_or_else(|| ForgeError::internal("balanced skeleton has no inputs"))?;
        let cluster_id = type_id_args(&first, CLUSTER_OUTPUT_INDEX as u64);

        let output = skeleton
            .outputs
            .get(CLUSTER_OUTPUT_INDEX)
            .cloned()
            .ok_or_else(|| ForgeError::internal("skeleton has no cluster output"))?;
        let type_script = output
            .type_
            .as_ref()
            .map(|script| script.with_args(cluster_id.to_vec()))
            .ok_or_else(|| ForgeError::internal("cluster output has no type script"))?;
        let output = CellOutput::new(output.capacity, output.lock, Some(type_script));

        let skeleton = skeleton.with_output_at(CLUSTER_OUTPUT_INDEX, output)?;
        skeleton.verify_occupancy()?;
        Ok((skeleton, H256(cluster_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::skeleton::{InputSource, SkeletonInput};
    use crate::types::{OutPoint, ScriptHashType, ONE_CKB};

    fn owner() -> Script {
        Script::new(H256([0x9b; 32]), ScriptHashType::Type, vec![7u8; 20])
    }

    fn spec() -> ClusterSpec {
        ClusterSpec {
            name: "Genesis".to_string(),
            description: serde_json::json!({"description": "first drop", "dob": {"ver": 0}}),
        }
    }

    #[test]
    fn test_capacity_matches_occupancy_plus_margin() {
        let builder = ClusterTxBuilder::new(ScriptsConfig::default());
        let skeleton = builder.assemble(&spec(), &owner()).unwrap();
        let data_len = skeleton.outputs_data[0].len() as u64;
        assert_eq!(skeleton.outputs.len(), 1);
        assert_eq!(skeleton.outputs[0].capacity, (53 + 65 + 8 + data_len + 1) * ONE_CKB);
    }

    #[test]
    fn test_string_description_is_stored_verbatim() {
        let spec = ClusterSpec {
            name: "n".into(),
            description: serde_json::json!("plain"),
        };
        assert_eq!(spec.description_text().unwrap(), "plain");
    }

    #[test]
    fn test_finalize_sets_type_id() {
        let builder = ClusterTxBuilder::new(ScriptsConfig::default());
        let first = OutPoint::new(H256([4; 32]), 1);
        let skeleton = builder
            .assemble(&spec(), &owner())
            .unwrap()
            .with_input(SkeletonInput::new(first.clone(), 10_000 * ONE_CKB, InputSource::Collected));

        let (skeleton, cluster_id) = builder.finalize(skeleton).unwrap();
        assert_eq!(cluster_id.0, type_id_args(&first, 0));
        assert_eq!(
            skeleton.outputs[0].type_.as_ref().unwrap().args,
            cluster_id.0.to_vec()
        );
    }

    #[test]
    fn test_finalize_without_inputs_is_internal_error() {
        let builder = ClusterTxBuilder::new(ScriptsConfig::default());
        let skeleton = builder.assemble(&spec(), &owner()).unwrap();
        assert!(matches!(builder.finalize(skeleton), Err(ForgeError::Internal(_))));
    }
}
