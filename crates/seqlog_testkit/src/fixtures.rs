//! Test fixtures and log helpers.
//!
//! Provides convenience functions for setting up test logs
//! and common test scenarios.

use seqlog_core::{Appender, CoreResult, LogConfig, MemoryMedium, StartPosition, Tailer};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A log directory inside a temporary directory, removed on drop.
pub struct TempLog {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempLog {
    /// Creates an empty temporary location. The log itself is created by
    /// the first appender.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("log");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the log directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the appender with the default configuration.
    pub fn appender(&self) -> CoreResult<Appender> {
        Appender::open(&self.path)
    }

    /// Opens the appender with `config`.
    pub fn appender_with(&self, config: LogConfig) -> CoreResult<Appender> {
        Appender::open_with_config(&self.path, config)
    }

    /// Opens a tailer.
    pub fn tailer(&self, start: StartPosition) -> CoreResult<Tailer> {
        Tailer::open(&self.path, start)
    }
}

impl Default for TempLog {
    fn default() -> Self {
        Self::new()
    }
}

/// A configuration with tiny segments so tests cross many boundaries.
pub fn small_segments() -> LogConfig {
    LogConfig::default()
        .segment_capacity_bytes(64)
        .max_payload_bytes(60)
}

/// Runs a test against an appender on a fresh in-memory log.
///
/// # Example
///
/// ```rust,ignore
/// use seqlog_testkit::with_memory_log;
///
/// #[test]
/// fn my_test() {
///     with_memory_log(|appender, _medium| {
///         assert_eq!(appender.append(b"a").unwrap(), 0);
///     });
/// }
/// ```
pub fn with_memory_log<F, R>(f: F) -> R
where
    F: FnOnce(&Appender, &MemoryMedium) -> R,
{
    with_memory_log_config(LogConfig::default(), f)
}

/// Like [`with_memory_log`], with a custom configuration.
pub fn with_memory_log_config<F, R>(config: LogConfig, f: F) -> R
where
    F: FnOnce(&Appender, &MemoryMedium) -> R,
{
    let medium = MemoryMedium::new();
    let appender =
        Appender::open_in_memory(medium.clone(), config).expect("Failed to open in-memory log");
    f(&appender, &medium)
}

/// Runs a test against an appender on a fresh file-based log.
pub fn with_file_log<F, R>(f: F) -> R
where
    F: FnOnce(&Appender, &Path) -> R,
{
    with_file_log_config(LogConfig::default(), f)
}

/// Like [`with_file_log`], with a custom configuration.
pub fn with_file_log_config<F, R>(config: LogConfig, f: F) -> R
where
    F: FnOnce(&Appender, &Path) -> R,
{
    let log = TempLog::new();
    let appender = log
        .appender_with(config)
        .expect("Failed to open file log");
    f(&appender, log.path())
}

/// Appends `count` numbered payloads, returning them in index order.
pub fn append_numbered(appender: &Appender, count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let payload = format!("record-{i:06}").into_bytes();
            appender.append(&payload).expect("append failed");
            payload
        })
        .collect()
}

/// Polls `tailer` until it is caught up, returning every payload read.
pub fn drain_payloads(tailer: &mut Tailer) -> Vec<Vec<u8>> {
    let mut payloads = Vec::new();
    while let Some(record) = tailer.poll().expect("poll failed") {
        payloads.push(record.payload);
    }
    payloads
}
