//! Skeleton sizing and balancing benchmarks
//!
//! Fee estimation serializes the whole transaction on every balancing pass,
//! so its cost grows with the number of inputs the balancer pulls in.
//!
//! Run with `cargo bench --features test_utils`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ckb_types::H256;
use std::sync::Arc;

use spore_forge::test_utils::{plain_cell, secp_lock, MockChain};
use spore_forge::tx_builder::{CapacityBalancer, InputSource, SkeletonInput, TransactionSkeleton};
use spore_forge::types::{CellOutput, OutPoint, ONE_CKB};

const FEE_RATE: u64 = 1000;

fn skeleton_with_inputs(inputs: u32) -> TransactionSkeleton {
    (0..inputs).fold(
        TransactionSkeleton::new()
            .with_output(CellOutput::new(300 * ONE_CKB, secp_lock(2), None), Vec::new()),
        |skeleton, i| {
            skeleton.with_input(SkeletonInput::new(
                OutPoint::new(H256([7; 32]), i),
                100 * ONE_CKB,
                InputSource::Supplied,
            ))
        },
    )
}

fn bench_fee(c: &mut Criterion) {
    let mut group = c.benchmark_group("skeleton_fee");
    for inputs in [1u32, 10, 100] {
        let skeleton = skeleton_with_inputs(inputs);
        group.bench_with_input(BenchmarkId::from_parameter(inputs), &skeleton, |b, skeleton| {
            b.iter(|| black_box(skeleton.fee(FEE_RATE)))
        });
    }
    group.finish();
}

fn bench_balance(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let lock = secp_lock(1);
    let mut group = c.benchmark_group("balance");
    for cells in [1u32, 20] {
        // 400 CKB split across the pool; a 300 CKB output needs most of it
        let pool: Vec<_> = (0..cells)
            .map(|i| plain_cell(&lock, 0xf0, i, (400 / cells as u64).max(20) * ONE_CKB))
            .collect();
        let collector = Arc::new(MockChain::with_cells(pool));
        let balancer = CapacityBalancer::new(collector, lock.clone(), FEE_RATE);
        let skeleton = TransactionSkeleton::new()
            .with_output(CellOutput::new(300 * ONE_CKB, secp_lock(2), None), Vec::new());

        group.bench_with_input(BenchmarkId::from_parameter(cells), &skeleton, |b, skeleton| {
            b.iter(|| {
                rt.block_on(balancer.balance(skeleton.clone()))
                    .map(|(balanced, _)| black_box(balanced.inputs.len()))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fee, bench_balance);
criterion_main!(benches);
