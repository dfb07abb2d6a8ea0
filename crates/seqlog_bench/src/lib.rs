//! Benchmark utilities.

use rand::Rng;
use seqlog_core::{Appender, DurabilityPolicy, LogConfig, MemoryMedium};

/// Generate random payload data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` payloads with sizes drawn from `min..=max`.
pub fn random_payloads(count: usize, min: usize, max: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| random_data(rng.gen_range(min..=max)))
        .collect()
}

/// Benchmark configuration: 1 MiB segments, 64 KiB payloads, no syncs.
pub fn bench_config() -> LogConfig {
    LogConfig::default()
        .segment_capacity_bytes(1 << 20)
        .max_payload_bytes(1 << 16)
        .durability(DurabilityPolicy::NoExplicitSync)
}

/// An in-memory log holding `count` records of `size` bytes.
pub fn filled_memory_log(count: usize, size: usize) -> (Appender, MemoryMedium) {
    let medium = MemoryMedium::new();
    let appender = Appender::open_in_memory(medium.clone(), bench_config()).expect("open log");
    let payload = random_data(size);
    for _ in 0..count {
        appender.append(&payload).expect("append");
    }
    (appender, medium)
}
