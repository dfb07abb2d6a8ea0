//! Tailer benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use seqlog_bench::{bench_config, filled_memory_log, random_data};
use seqlog_core::{Appender, StartPosition, Tailer};
use tempfile::TempDir;

/// Benchmark reading a whole log from the beginning.
fn bench_catch_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("catch_up");

    for count in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (_appender, medium) = filled_memory_log(count, 128);

            b.iter(|| {
                let mut tailer = Tailer::open_in_memory(medium.clone(), StartPosition::Beginning).unwrap();
                let mut read = 0usize;
                while let Some(record) = tailer.poll().unwrap() {
                    read += record.payload.len();
                }
                black_box(read);
            });
        });
    }

    group.finish();
}

/// Benchmark opening a tailer at a random index.
fn bench_random_start(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_start");
    let count = 10_000u64;
    let (_appender, medium) = filled_memory_log(count as usize, 64);

    group.bench_function("memory_10000_records", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let start = StartPosition::Index(rng.gen_range(0..count));
            let mut tailer = Tailer::open_in_memory(medium.clone(), black_box(start)).unwrap();
            black_box(tailer.poll().unwrap());
        });
    });

    group.finish();
}

/// Benchmark polling an idle, caught-up file tailer.
fn bench_idle_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("idle_poll");

    group.bench_function("file", |b| {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log");
        let appender = Appender::open_with_config(&path, bench_config()).unwrap();
        appender.append(&random_data(64)).unwrap();
        let mut tailer = Tailer::open(&path, StartPosition::End).unwrap();

        b.iter(|| {
            black_box(tailer.poll().unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_catch_up, bench_random_start, bench_idle_poll);
criterion_main!(benches);
