//! Mint list and cluster metadata files

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{ForgeError, ForgeResult};
use crate::tx_builder::cluster::ClusterSpec;

/// One recipient of a batch mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintItem {
    pub address: String,
    pub token_id: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MintList {
    items: Vec<MintItem>,
    batch_size: usize,
}

impl MintList {
    pub fn new(items: Vec<MintItem>, batch_size: usize) -> Self {
        Self { items, batch_size }
    }

    /// Load `[{"address": .., "token_id": ..}, ..]`
    pub fn load(path: impl AsRef<Path>, batch_size: usize) -> ForgeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ForgeError::malformed(format!("read {}: {e}", path.display())))?;
        let items: Vec<MintItem> = serde_json::from_str(&content)
            .map_err(|e| ForgeError::malformed(format!("parse {}: {e}", path.display())))?;
        Ok(Self::new(items, batch_size))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        if self.batch_size == 0 {
            0
        } else {
            self.items.len().div_ceil(self.batch_size)
        }
    }

    /// Items of the 1-based batch `batch_no`; empty past the end
    pub fn batch(&self, batch_no: usize) -> ForgeResult<&[MintItem]> {
        if batch_no == 0 {
            return Err(ForgeError::malformed("batch numbers start at 1"));
        }
        if self.batch_size == 0 {
            return Err(ForgeError::malformed("batch size must be positive"));
        }
        let start = (batch_no - 1).saturating_mul(self.batch_size).min(self.items.len());
        let end = start.saturating_add(self.batch_size).min(self.items.len());
        Ok(&self.items[start..end])
    }
}

/// `<dir>/cluster-<no>.json`
pub fn load_cluster_spec(dir: impl AsRef<Path>, cluster_no: u32) -> ForgeResult<ClusterSpec> {
    let path = dir.as_ref().join(format!("cluster-{cluster_no}.json"));
    let content = std::fs::read_to_string(&path)
        .map_err(|e| ForgeError::malformed(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| ForgeError::malformed(format!("parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(n: u64, batch_size: usize) -> MintList {
        let items = (1..=n)
            .map(|token_id| MintItem {
                address: format!("ckt1addr{token_id}"),
                token_id,
            })
            .collect();
        MintList::new(items, batch_size)
    }

    #[test]
    fn test_batches_partition_the_list() {
        let list = list(250, 100);
        assert_eq!(list.batch_count(), 3);
        assert_eq!(list.batch(1).unwrap().len(), 100);
        assert_eq!(list.batch(2).unwrap()[0].token_id, 101);
        assert_eq!(list.batch(3).unwrap().len(), 50);
        assert!(list.batch(4).unwrap().is_empty());
    }

    #[test]
    fn test_batch_zero_rejected() {
        assert!(matches!(list(3, 2).batch(0), Err(ForgeError::MalformedInput(_))));
    }
}
