//! Appender statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! use seqlog_core::Appender;
//!
//! let appender = Appender::open(path)?;
//! appender.append(b"hello")?;
//!
//! let stats = appender.stats().snapshot();
//! println!("Appended: {}", stats.records_appended);
//! println!("Syncs: {}", stats.syncs);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Appender statistics.
///
/// All counters are atomic and can be read while appends are in progress.
/// Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct LogStats {
    /// Records published.
    records_appended: AtomicU64,
    /// Payload bytes published (excluding frame headers).
    bytes_appended: AtomicU64,
    /// Explicit syncs of the tail segment.
    syncs: AtomicU64,
    /// Segments sealed and replaced by a new tail.
    rollovers: AtomicU64,
    /// Appends that returned `WriteFailed`.
    failed_appends: AtomicU64,
}

impl LogStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_append(&self, payload_bytes: u64) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(payload_bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_sync(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollover(&self) {
        self.rollovers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_appends.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of records published by this appender.
    pub fn records_appended(&self) -> u64 {
        self.records_appended.load(Ordering::Relaxed)
    }

    /// Returns the payload bytes published by this appender.
    pub fn bytes_appended(&self) -> u64 {
        self.bytes_appended.load(Ordering::Relaxed)
    }

    /// Returns the number of explicit syncs.
    pub fn syncs(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }

    /// Returns the number of segment rollovers.
    pub fn rollovers(&self) -> u64 {
        self.rollovers.load(Ordering::Relaxed)
    }

    /// Returns the number of failed appends.
    pub fn failed_appends(&self) -> u64 {
        self.failed_appends.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_appended: self.records_appended(),
            bytes_appended: self.bytes_appended(),
            syncs: self.syncs(),
            rollovers: self.rollovers(),
            failed_appends: self.failed_appends(),
        }
    }
}

/// A point-in-time copy of [`LogStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Records published.
    pub records_appended: u64,
    /// Payload bytes published.
    pub bytes_appended: u64,
    /// Explicit syncs.
    pub syncs: u64,
    /// Segment rollovers.
    pub rollovers: u64,
    /// Failed appends.
    pub failed_appends: u64,
}
