//! Appender benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use seqlog_bench::{bench_config, random_data};
use seqlog_core::{Appender, DurabilityPolicy, MemoryMedium};
use std::time::Duration;
use tempfile::TempDir;

/// Benchmark in-memory appends by payload size.
fn bench_memory_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_append");

    for size in [16, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let appender = Appender::open_in_memory(MemoryMedium::new(), bench_config()).unwrap();
            let data = random_data(size);

            b.iter(|| {
                let index = appender.append(black_box(&data)).unwrap();
                black_box(index);
            });
        });
    }

    group.finish();
}

/// Benchmark file appends under each durability policy.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");
    group.sample_size(20);
    group.throughput(Throughput::Bytes(256));

    let policies = [
        ("none", DurabilityPolicy::NoExplicitSync),
        (
            "interval",
            DurabilityPolicy::SyncInterval {
                records: 64,
                interval: Duration::from_millis(100),
            },
        ),
        ("every_write", DurabilityPolicy::SyncEveryWrite),
    ];

    for (name, policy) in policies {
        group.bench_function(name, |b| {
            let temp_dir = TempDir::new().unwrap();
            let appender =
                Appender::open_with_config(temp_dir.path().join("log"), bench_config().durability(policy))
                    .unwrap();
            let data = random_data(256);

            b.iter(|| {
                let index = appender.append(black_box(&data)).unwrap();
                black_box(index);
            });
        });
    }

    group.finish();
}

/// Benchmark appends that keep crossing segment boundaries.
fn bench_rollover(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollover");
    group.sample_size(20);

    group.bench_function("file_4k_segments", |b| {
        let temp_dir = TempDir::new().unwrap();
        let config = bench_config().segment_capacity_bytes(4096).max_payload_bytes(1024);
        let appender = Appender::open_with_config(temp_dir.path().join("log"), config).unwrap();
        let data = random_data(1000);

        b.iter(|| {
            appender.append(black_box(&data)).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_memory_append, bench_file_append, bench_rollover);
criterion_main!(benches);
