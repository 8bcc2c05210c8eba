//! # Pool Benchmark
//!
//! Steady-state acquire/release must not allocate once the pool is warm.
//!
//! Run with: `cargo bench --package ember_core --bench pool_benchmark`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ember_core::{ObjectPool, PoolConfig};

/// A stand-in for an effect instance: big enough that rebuilding it hurts.
#[derive(Clone)]
struct Payload {
    data: [f32; 64],
}

/// Benchmark: acquire then release on a warm pool.
fn bench_warm_cycle(c: &mut Criterion) {
    let mut pool = ObjectPool::new(PoolConfig::with_capacity(64));
    pool.prewarm(64, || Payload { data: [0.0; 64] });

    c.bench_function("pool_warm_acquire_release", |b| {
        b.iter(|| {
            let acquired = pool.acquire_with(|| Payload { data: [0.0; 64] });
            black_box(pool.get(acquired.handle).map(|p| p.data[0]));
            black_box(pool.release(acquired.handle).is_ok())
        });
    });
}

/// Benchmark: burst of N concurrent acquisitions followed by N releases.
fn bench_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_burst");

    for count in [8usize, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut pool = ObjectPool::new(PoolConfig::with_capacity(count));
            pool.prewarm(count, || Payload { data: [0.0; 64] });
            let mut handles = Vec::with_capacity(count);

            b.iter(|| {
                for _ in 0..count {
                    handles.push(pool.acquire_with(|| Payload { data: [0.0; 64] }).handle);
                }
                for handle in handles.drain(..) {
                    black_box(pool.release(handle).is_ok());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_warm_cycle, bench_burst);
criterion_main!(benches);
