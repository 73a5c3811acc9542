//! Needed/exceed balancing against in-memory collectors

#[cfg(test)]
mod balancer_tests {
    use async_trait::async_trait;
    use ckb_types::H256;
    use proptest::prelude::*;
    use std::sync::Arc;

    use crate::errors::ForgeError;
    use crate::rpc::{CellCollector, RpcError};
    use crate::test_utils::{plain_cell, secp_lock, MockChain};
    use crate::tests::test_helpers::*;
    use crate::tx_builder::balancer::CapacityBalancer;
    use crate::tx_builder::skeleton::{InputSource, SkeletonInput, TransactionSkeleton};
    use crate::types::{CellOutput, LiveCell, OutPoint, Script};

    /// Collector returning a fixed list, typed cells included
    struct FixedCollector(Vec<LiveCell>);

    #[async_trait]
    impl CellCollector for FixedCollector {
        async fn list_spendable(&self, _lock: &Script) -> Result<Vec<LiveCell>, RpcError> {
            Ok(self.0.clone())
        }

        async fn find_type_cell(&self, _type_script: &Script) -> Result<Option<LiveCell>, RpcError> {
            Ok(None)
        }
    }

    fn change_lock() -> Script {
        secp_lock(SIGNER_SEED)
    }

    fn skeleton(input: u64, output: u64) -> TransactionSkeleton {
        TransactionSkeleton::new()
            .with_input(SkeletonInput::new(
                OutPoint::new(H256([0x11; 32]), 0),
                input,
                InputSource::Supplied,
            ))
            .with_output(CellOutput::new(output, secp_lock(RECIPIENT_SEED), None), Vec::new())
    }

    fn balancer(cells: Vec<LiveCell>) -> CapacityBalancer {
        CapacityBalancer::new(Arc::new(MockChain::with_cells(cells)), change_lock(), FEE_RATE)
    }

    #[tokio::test]
    async fn test_one_collected_cell_covers_shortfall_and_remainder_becomes_change() {
        let balancer = balancer(vec![plain_cell(&change_lock(), 0xf0, 0, ckb(500))]);

        let (balanced, report) = balancer.balance(skeleton(ckb(1000), ckb(1200))).await.unwrap();

        assert_eq!(report.cells_collected, 1);
        assert_eq!(report.passes, 2);
        assert_eq!(report.fee, balanced.fee(FEE_RATE));
        assert_eq!(report.change, Some(ckb(300) - report.fee));

        let change = balanced.outputs.last().unwrap();
        assert_eq!(change.lock, change_lock());
        assert_eq!(change.capacity, ckb(300) - report.fee);
        assert_eq!(
            balanced.input_capacity().unwrap(),
            balanced.output_capacity().unwrap() + report.fee
        );
        assert!(balanced.verify_balance(FEE_RATE).is_ok());
    }

    #[tokio::test]
    async fn test_state_reports_needed_and_exceed() {
        let balancer = balancer(Vec::new());

        let short = balancer.state(&skeleton(ckb(1000), ckb(1200))).unwrap();
        assert!(short.needed_capacity > ckb(200));
        assert_eq!(short.exceed_capacity, 0);

        let rich = balancer.state(&skeleton(ckb(1000), ckb(500))).unwrap();
        assert_eq!(rich.needed_capacity, 0);
        assert!(rich.exceed_capacity > ckb(499));
    }

    #[tokio::test]
    async fn test_surplus_is_returned_without_collecting() {
        let balancer = balancer(vec![plain_cell(&change_lock(), 0xf0, 0, ckb(500))]);

        let (balanced, report) = balancer.balance(skeleton(ckb(1000), ckb(500))).await.unwrap();

        assert_eq!(report.cells_collected, 0);
        assert_eq!(balanced.inputs.len(), 1);
        assert_eq!(balanced.outputs.len(), 2);
        assert_eq!(report.change, Some(ckb(500) - report.fee));
    }

    #[tokio::test]
    async fn test_remainder_too_small_for_change_pulls_another_cell() {
        let balancer = balancer(vec![plain_cell(&change_lock(), 0xf0, 0, ckb(100))]);

        // 10 CKB left over cannot hold a 61 CKB change cell
        let (balanced, report) = balancer.balance(skeleton(ckb(1000), ckb(990))).await.unwrap();

        assert_eq!(report.cells_collected, 1);
        assert_eq!(balanced.outputs.len(), 2);
        assert_eq!(report.change, Some(ckb(110) - report.fee));
    }

    #[tokio::test]
    async fn test_change_is_always_last() {
        let balancer = balancer(vec![plain_cell(&change_lock(), 0xf0, 0, ckb(2000))]);
        let base = skeleton(ckb(100), ckb(300))
            .with_output(CellOutput::new(ckb(100), secp_lock(RECIPIENT_SEED), None), Vec::new());

        let (balanced, _) = balancer.balance(base).await.unwrap();

        assert_eq!(balanced.outputs.len(), 3);
        assert_eq!(balanced.outputs[0].capacity, ckb(300));
        assert_eq!(balanced.outputs[1].capacity, ckb(100));
        assert_eq!(balanced.outputs[2].lock, change_lock());
    }

    #[tokio::test]
    async fn test_typed_and_already_used_cells_are_skipped() {
        let mut typed = plain_cell(&change_lock(), 0xe0, 0, ckb(5000));
        typed.output.type_ = Some(secp_lock(9));
        let reused = LiveCell {
            out_point: OutPoint::new(H256([0x11; 32]), 0),
            ..plain_cell(&change_lock(), 0x11, 0, ckb(5000))
        };
        let good = plain_cell(&change_lock(), 0xf0, 0, ckb(500));
        let balancer = CapacityBalancer::new(
            Arc::new(FixedCollector(vec![typed.clone(), reused, good.clone()])),
            change_lock(),
            FEE_RATE,
        );

        let (balanced, report) = balancer.balance(skeleton(ckb(1000), ckb(1200))).await.unwrap();

        assert_eq!(report.cells_collected, 1);
        assert!(balanced.contains_input(&good.out_point));
        assert!(!balanced.contains_input(&typed.out_point));
    }

    #[tokio::test]
    async fn test_no_inputs_and_no_cells_is_no_spendable_cell() {
        let balancer = balancer(Vec::new());
        let empty = TransactionSkeleton::new()
            .with_output(CellOutput::new(ckb(100), secp_lock(RECIPIENT_SEED), None), Vec::new());

        let err = balancer.balance(empty).await.unwrap_err();
        assert!(matches!(err, ForgeError::NoSpendableCell(_)));
    }

    #[tokio::test]
    async fn test_exhausted_pool_is_insufficient_input() {
        let balancer = balancer(vec![plain_cell(&change_lock(), 0xf0, 0, ckb(100))]);

        let err = balancer.balance(skeleton(ckb(1000), ckb(1200))).await.unwrap_err();
        match err {
            ForgeError::InsufficientInput { needed, available } => {
                assert_eq!(available, ckb(1100));
                assert!(needed > ckb(100));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_overflowing_capacities_are_malformed() {
        let balancer = balancer(vec![plain_cell(&change_lock(), 0xf0, 0, ckb(500))]);

        let err = balancer.balance(skeleton(ckb(1000), u64::MAX)).await.unwrap_err();
        assert!(matches!(err, ForgeError::MalformedInput(_)));

        let two_huge = skeleton(u64::MAX, ckb(100)).with_input(SkeletonInput::new(
            OutPoint::new(H256([0x12; 32]), 0),
            u64::MAX,
            InputSource::Supplied,
        ));
        assert!(matches!(balancer.state(&two_huge), Err(ForgeError::MalformedInput(_))));
    }

    fn capacity() -> impl Strategy<Value = u64> {
        prop_oneof![
            8 => ckb(61)..ckb(5_000),
            1 => (u64::MAX - ckb(1_000))..=u64::MAX,
        ]
    }

    proptest! {
        #[test]
        fn balanced_skeletons_conserve_capacity(
            inputs in prop::collection::vec(capacity(), 0..4),
            outputs in prop::collection::vec(capacity(), 1..4),
            pool in prop::collection::vec(ckb(61)..ckb(3_000), 0..6),
            fee_rate in 1_000u64..5_000,
        ) {
            let mut base = TransactionSkeleton::new();
            for (i, amount) in inputs.iter().enumerate() {
                base = base.with_input(SkeletonInput::new(
                    OutPoint::new(H256([0x10 + i as u8; 32]), 0),
                    *amount,
                    InputSource::Supplied,
                ));
            }
            for amount in &outputs {
                base = base.with_output(CellOutput::new(*amount, secp_lock(RECIPIENT_SEED), None), Vec::new());
            }
            let cells: Vec<LiveCell> = pool
                .iter()
                .enumerate()
                .map(|(i, amount)| plain_cell(&change_lock(), 0xf0, i as u32, *amount))
                .collect();
            let balancer = CapacityBalancer::new(Arc::new(MockChain::with_cells(cells)), change_lock(), fee_rate);

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            match runtime.block_on(balancer.balance(base.clone())) {
                Ok((balanced, report)) => {
                    prop_assert!(balanced.verify_balance(fee_rate).is_ok());
                    prop_assert!(balanced.verify_occupancy().is_ok());
                    prop_assert_eq!(report.fee, balanced.fee(fee_rate));
                    prop_assert_eq!(&balanced.outputs[..outputs.len()], &base.outputs[..]);
                    if let Some(change) = report.change {
                        let last = balanced.outputs.last().unwrap();
                        prop_assert_eq!(last.capacity, change);
                        prop_assert_eq!(&last.lock, &change_lock());
                    } else {
                        prop_assert_eq!(balanced.outputs.len(), outputs.len());
                    }
                }
                Err(e) => prop_assert!(
                    matches!(
                        e,
                        ForgeError::InsufficientInput { .. }
                            | ForgeError::NoSpendableCell(_)
                            | ForgeError::MalformedInput(_)
                    ),
                    "unexpected error: {}",
                    e
                ),
            }
        }
    }
}
