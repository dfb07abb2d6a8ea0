//! # seqlog core
//!
//! A durable, single-writer / multi-reader append-only record log.
//!
//! This crate provides:
//! - [`Appender`]: the single writer; appends opaque payloads and returns
//!   dense indices starting at 0
//! - [`Tailer`]: an independent, non-blocking read cursor
//! - Segment files with a dense on-disk index, so a tailer can start at any
//!   index without rescanning the log
//! - Crash recovery that loses at most the record being written
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seqlog_core::{open_appender, open_tailer, StartPosition};
//!
//! let appender = open_appender("queue")?;
//! appender.append(b"hello")?;
//!
//! let mut tailer = open_tailer("queue", StartPosition::Beginning)?;
//! while let Some(record) = tailer.poll()? {
//!     println!("[{}] {}", record.index, String::from_utf8_lossy(&record.payload));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod appender;
pub mod codec;
mod config;
pub mod dir;
mod error;
pub mod index;
mod inspect;
pub mod medium;
pub mod recovery;
pub mod segment;
mod stats;
mod tailer;
mod types;

pub use appender::Appender;
pub use config::{DurabilityPolicy, LogConfig};
pub use dir::LogDir;
pub use error::{CoreError, CoreResult};
pub use index::{IndexEntry, IndexTable};
pub use inspect::{inspect, inspect_medium, verify, verify_medium, LogSummary, VerifyProblem, VerifyReport};
pub use medium::{AccessMode, LogMedium, MemoryMedium, WriterLease};
pub use recovery::RecoveryReport;
pub use segment::SegmentInfo;
pub use stats::{LogStats, StatsSnapshot};
pub use tailer::{Position, Tailer, TailerState};
pub use types::{Record, SegmentId, StartPosition};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Opens the appender of the log at `path`, creating the log if missing.
///
/// # Errors
///
/// Returns `AlreadyOwned` if another appender holds the log.
pub fn open_appender(path: impl AsRef<std::path::Path>) -> CoreResult<Appender> {
    Appender::open(path)
}

/// Opens a tailer on the log at `path`.
///
/// # Errors
///
/// Returns `LogNotFound` if there is no log at `path`, or `IndexOutOfRange`
/// if `start` names an index with no record.
pub fn open_tailer(path: impl AsRef<std::path::Path>, start: StartPosition) -> CoreResult<Tailer> {
    Tailer::open(path, start)
}
