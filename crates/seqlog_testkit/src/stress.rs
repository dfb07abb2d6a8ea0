//! Stress tests for seqlog.
//!
//! These tests verify behavior under heavy load and concurrent access.

use seqlog_core::{Appender, StartPosition};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Records to append.
    pub operations: usize,
    /// Concurrent tailers (or writer threads, for the shared-appender test).
    pub threads: usize,
    /// Payload size in bytes.
    pub payload_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            payload_size: 256,
        }
    }
}

/// Payload for record `i`: the index in the first eight bytes, then filler.
pub fn stress_payload(i: u64, size: usize) -> Vec<u8> {
    let mut payload = vec![(i % 251) as u8; size.max(8)];
    payload[..8].copy_from_slice(&i.to_le_bytes());
    payload
}

/// Appends `operations` records from one thread.
pub fn stress_sequential_appends(appender: &Appender, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for _ in 0..config.operations {
        let expected = appender.next_index();
        match appender.append(&stress_payload(expected, config.payload_size)) {
            Ok(index) if index == expected => successful += 1,
            Ok(_) | Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Appends from one thread while `threads` tailers follow.
///
/// A read counts as failed if it arrives out of order or with the wrong
/// payload. Every tailer must end having read every record.
pub fn stress_tail_while_appending(appender: Arc<Appender>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let done = Arc::new(AtomicBool::new(false));
    let first = appender.next_index();
    let target = first + config.operations as u64;

    let readers: Vec<_> = (0..config.threads)
        .map(|_| {
            let mut tailer = appender
                .tailer(StartPosition::End)
                .expect("Failed to open tailer");
            let done = Arc::clone(&done);
            let size = config.payload_size;
            thread::spawn(move || {
                let mut successful = 0usize;
                let mut failed = 0usize;
                let mut expected = first;
                while expected < target {
                    // Read before polling so a miss after the writer is done is final.
                    let finished = done.load(Ordering::Acquire);
                    match tailer.poll() {
                        Ok(Some(record)) => {
                            if record.index == expected && record.payload == stress_payload(expected, size) {
                                successful += 1;
                            } else {
                                failed += 1;
                            }
                            expected = record.index + 1;
                        }
                        Ok(None) if finished => break,
                        Ok(None) => thread::yield_now(),
                        Err(_) => {
                            failed += 1;
                            break;
                        }
                    }
                }
                (successful, failed + (target - expected) as usize)
            })
        })
        .collect();

    let writes = stress_sequential_appends(&appender, config);
    done.store(true, Ordering::Release);

    let mut successful = writes.successful_ops;
    let mut failed = writes.failed_ops;
    for reader in readers {
        let (ok, bad) = reader.join().unwrap_or((0, config.operations));
        successful += ok;
        failed += bad;
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Appends from `threads` threads sharing one appender.
///
/// Fails any append whose index was already handed out.
pub fn stress_shared_appender(appender: Arc<Appender>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let per_thread = config.operations / config.threads.max(1);

    let writers: Vec<_> = (0..config.threads.max(1))
        .map(|t| {
            let appender = Arc::clone(&appender);
            let size = config.payload_size;
            thread::spawn(move || {
                let mut indices = Vec::with_capacity(per_thread);
                let mut failed = 0usize;
                for i in 0..per_thread {
                    match appender.append(&stress_payload((t * per_thread + i) as u64, size)) {
                        Ok(index) => indices.push(index),
                        Err(_) => failed += 1,
                    }
                }
                (indices, failed)
            })
        })
        .collect();

    let mut all = Vec::new();
    let mut failed = 0usize;
    for writer in writers {
        let (indices, bad) = writer.join().unwrap_or((Vec::new(), per_thread));
        all.extend(indices);
        failed += bad;
    }

    let before = all.len();
    all.sort_unstable();
    all.dedup();
    failed += before - all.len();

    StressTestResult::new(all.len(), failed, start.elapsed())
}
