//! # Slot Pool Benchmark
//!
//! The index pool sits on the region load/unload path; it must stay
//! O(1) per operation under streaming churn.
//!
//! Run with: `cargo bench --package basalt_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use basalt_core::IndexPool;

/// Benchmark: add N regions from scratch.
fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_add");

    for count in [256u64, 4096, 16384] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut pool: IndexPool<u64> = IndexPool::new();
                for i in 0..count {
                    black_box(pool.add(i));
                }
                pool.len()
            });
        });
    }

    group.finish();
}

/// Benchmark: steady-state churn (remove + add), the streaming pattern.
fn bench_churn(c: &mut Criterion) {
    c.bench_function("pool_churn_4096_live", |b| {
        let mut pool: IndexPool<u64> = IndexPool::new();
        for i in 0..4096u64 {
            pool.add(i);
        }

        let mut next = 4096u64;
        let mut oldest = 0u64;
        b.iter(|| {
            pool.remove(&oldest);
            oldest += 1;
            let slot = pool.add(next);
            next += 1;
            black_box(slot)
        });
    });
}

/// Benchmark: lookup of a live handle.
fn bench_index_of(c: &mut Criterion) {
    c.bench_function("pool_index_of", |b| {
        let mut pool: IndexPool<u64> = IndexPool::new();
        for i in 0..4096u64 {
            pool.add(i);
        }

        b.iter(|| black_box(pool.index_of(&2048)));
    });
}

criterion_group!(benches, bench_add, bench_churn, bench_index_of);
criterion_main!(benches);
