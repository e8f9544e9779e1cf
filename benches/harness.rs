//! Benchmarks for the local hot paths of a run: signing and block reduction.

use alloy_primitives::U256;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use node_stress::{
    metrics::{trim_idle_edges, BlockMetrics, DEFAULT_SLOT_DURATION},
    signer::TRANSFER_GAS,
    BlockTelemetry, FeePolicy, LogicalCallIntent, SenderIdentity, TransactionSigner,
};

/// Benchmarks signing a burst of transfers of different sizes.
fn bench_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("harness/sign_transfers");

    let sender = SenderIdentity::from_seed(1);
    let receiver = SenderIdentity::from_seed(2).address;
    let signer = TransactionSigner::new(32382, &FeePolicy::default(), Some(7_000_000_000));

    for &count in &[100usize, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                (0..count)
                    .map(|index| {
                        let intent = LogicalCallIntent::Transfer {
                            to: receiver,
                            value: U256::from(1u64),
                        };
                        let priced = signer.price(intent, index as u64, TRANSFER_GAS);
                        signer.sign(&sender, index, black_box(priced)).map(|p| p.raw.len())
                    })
                    .sum::<Result<usize, _>>()
            });
        });
    }

    group.finish();
}

/// A loaded range with idle blocks on both edges.
fn blocks(loaded: u64, idle: u64) -> Vec<BlockTelemetry> {
    (0..loaded + 2 * idle)
        .map(|i| {
            let busy = i >= idle && i < idle + loaded;
            BlockTelemetry {
                block_number: 1_000 + i,
                gas_used: if busy { 21_000 * 100 } else { 0 },
                base_fee_per_gas: 7,
                tx_count: if busy { 100 } else { 0 },
            }
        })
        .collect()
}

/// Benchmarks trimming and reducing block ranges of different lengths.
fn bench_reduction(c: &mut Criterion) {
    let mut group = c.benchmark_group("harness/reduce_blocks");

    for &loaded in &[10u64, 1_000, 100_000] {
        let range = blocks(loaded, 5);
        group.throughput(Throughput::Elements(range.len() as u64));
        group.bench_with_input(BenchmarkId::new("trim", loaded), &range, |b, range| {
            b.iter(|| trim_idle_edges(black_box(range)).len());
        });
        group.bench_with_input(BenchmarkId::new("metrics", loaded), &range, |b, range| {
            b.iter(|| BlockMetrics::from_blocks(black_box(range), DEFAULT_SLOT_DURATION));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_signing, bench_reduction);
criterion_main!(benches);
