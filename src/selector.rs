//! Classification of caller-supplied materials

use crate::types::{Material, MaterialKind, OutPoint};

/// Plain value cell reference with the capacity the caller claimed for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRef {
    pub out_point: OutPoint,
    pub amount: Option<u64>,
}

/// Materials partitioned by kind, each side in the order supplied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub record_refs: Vec<OutPoint>,
    pub record_amounts: Vec<Option<u64>>,
    pub value_refs: Vec<ValueRef>,
}

impl Classified {
    /// No record cell to melt: the builder mints a fresh record
    pub fn is_create(&self) -> bool {
        self.record_refs.is_empty()
    }
}

/// Partition `materials` into record-cell and value-cell references
///
/// Duplicates are kept; a duplicated out point is a caller error that the
/// node reports as a double spend.
pub fn classify(materials: &[Material]) -> Classified {
    let mut classified = Classified::default();
    for material in materials {
        match material.kind {
            MaterialKind::RecordCell => {
                classified.record_refs.push(material.out_point.clone());
                classified.record_amounts.push(material.amount);
            }
            MaterialKind::ValueCell => classified.value_refs.push(ValueRef {
                out_point: material.out_point.clone(),
                amount: material.amount,
            }),
        }
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckb_types::H256;

    fn op(byte: u8, index: u32) -> OutPoint {
        OutPoint::new(H256([byte; 32]), index)
    }

    #[test]
    fn test_empty_materials_select_create_mode() {
        let classified = classify(&[]);
        assert!(classified.is_create());
        assert!(classified.value_refs.is_empty());
    }

    #[test]
    fn test_partition_preserves_order_and_duplicates() {
        let materials = vec![
            Material::value(op(1, 0), 100),
            Material::record(op(2, 0), None),
            Material::value(op(3, 1), 200),
            Material::record(op(2, 0), Some(5)),
        ];
        let classified = classify(&materials);

        assert!(!classified.is_create());
        assert_eq!(classified.record_refs, vec![op(2, 0), op(2, 0)]);
        assert_eq!(classified.record_amounts, vec![None, Some(5)]);
        assert_eq!(
            classified.value_refs,
            vec![
                ValueRef { out_point: op(1, 0), amount: Some(100) },
                ValueRef { out_point: op(3, 1), amount: Some(200) },
            ]
        );
    }
}
