//! Read-only inspection and verification.
//!
//! Neither function takes the writer lock or modifies anything, so both are
//! safe to run next to a live appender.

use crate::dir::LogDir;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexEntry, IndexTable, INDEX_ENTRY_SIZE};
use crate::medium::{AccessMode, LogMedium};
use crate::segment::{SegmentInfo, SegmentReader};
use std::path::Path;
use std::sync::Arc;

/// Summary of a log's layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSummary {
    /// Every segment with its size.
    pub segments: Vec<SegmentInfo>,
    /// Published records.
    pub records: u64,
    /// Highest published index, if any.
    pub highest_index: Option<u64>,
    /// Size of the index file in bytes.
    pub index_bytes: u64,
}

impl LogSummary {
    /// Total bytes across all segments.
    #[must_use]
    pub fn segment_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.size).sum()
    }
}

/// A problem found by [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyProblem {
    /// The index file ends in a partial entry.
    TornIndexEntry {
        /// Bytes past the last whole entry.
        bytes: u64,
    },
    /// An entry does not resolve to a frame of its recorded length.
    CorruptEntry {
        /// Record index.
        index: u64,
        /// What was wrong.
        reason: String,
    },
    /// An entry points before the end of the previous record.
    OutOfOrder {
        /// Record index.
        index: u64,
    },
}

impl std::fmt::Display for VerifyProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TornIndexEntry { bytes } => write!(f, "index ends in a torn {bytes}-byte entry"),
            Self::CorruptEntry { index, reason } => write!(f, "record {index}: {reason}"),
            Self::OutOfOrder { index } => write!(f, "record {index}: entry out of order"),
        }
    }
}

/// Outcome of [`verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Index entries checked.
    pub records_checked: u64,
    /// Problems found, in index order.
    pub problems: Vec<VerifyProblem>,
    /// Bytes in the last segment after the last indexed frame. Non-zero
    /// after a crash, or while an appender is running with lazy index syncs.
    pub unindexed_bytes: u64,
}

impl VerifyReport {
    /// Returns true if no problems were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Summarizes the log at `path`.
///
/// # Errors
///
/// Returns `LogNotFound` if there is no log at `path`.
pub fn inspect(path: impl AsRef<Path>) -> CoreResult<LogSummary> {
    inspect_medium(&LogDir::open(path.as_ref(), false)?)
}

/// Summarizes a log on any medium.
///
/// # Errors
///
/// Fails on I/O errors or an invalid segment layout.
pub fn inspect_medium(medium: &dyn LogMedium) -> CoreResult<LogSummary> {
    let segments = segment_infos(medium)?;
    let (records, index_bytes) = match medium.open_index(AccessMode::ReadOnly)? {
        Some(backend) => {
            let bytes = backend.size()?;
            (bytes / INDEX_ENTRY_SIZE as u64, bytes)
        }
        None => (0, 0),
    };

    Ok(LogSummary {
        segments,
        records,
        highest_index: records.checked_sub(1),
        index_bytes,
    })
}

/// Checks the log at `path` for consistency.
///
/// # Errors
///
/// Returns `LogNotFound` if there is no log at `path`. Problems with the
/// log's contents are reported in the [`VerifyReport`], not as errors.
pub fn verify(path: impl AsRef<Path>) -> CoreResult<VerifyReport> {
    let dir = LogDir::open(path.as_ref(), false)?;
    verify_medium(Arc::new(dir))
}

/// Checks a log on any medium for consistency.
///
/// # Errors
///
/// Fails on I/O errors or an invalid segment layout.
pub fn verify_medium(medium: Arc<dyn LogMedium>) -> CoreResult<VerifyReport> {
    let segments = segment_infos(medium.as_ref())?;
    let mut report = VerifyReport::default();

    let Some(backend) = medium.open_index(AccessMode::ReadOnly)? else {
        report.unindexed_bytes = segments.iter().map(|s| s.size).sum();
        return Ok(report);
    };

    let torn = backend.size()? % INDEX_ENTRY_SIZE as u64;
    if torn != 0 {
        report.problems.push(VerifyProblem::TornIndexEntry { bytes: torn });
    }

    let index = IndexTable::open(backend)?;
    let mut reader = SegmentReader::new(Arc::clone(&medium));
    let mut previous: Option<IndexEntry> = None;

    for i in 0..index.len() {
        let entry = index.lookup(i)?;

        if let Some(prev) = previous {
            let ordered = entry.segment_id > prev.segment_id
                || (entry.segment_id == prev.segment_id && entry.offset >= prev.end());
            if !ordered {
                report.problems.push(VerifyProblem::OutOfOrder { index: i });
            }
        }

        match reader.read_entry(&entry) {
            Ok(_) => {}
            Err(CoreError::CorruptFrame { reason, .. }) => {
                report.problems.push(VerifyProblem::CorruptEntry { index: i, reason });
            }
            Err(e) => return Err(e),
        }

        report.records_checked += 1;
        previous = Some(entry);
    }

    if let Some(last) = segments.last() {
        report.unindexed_bytes = match previous {
            Some(entry) if entry.segment_id == last.id => last.size.saturating_sub(entry.end()),
            Some(_) | None => last.size,
        };
    }

    Ok(report)
}

fn segment_infos(medium: &dyn LogMedium) -> CoreResult<Vec<SegmentInfo>> {
    medium
        .segment_ids()?
        .into_iter()
        .map(|id| -> CoreResult<SegmentInfo> {
            let size = medium.open_segment(id, AccessMode::ReadOnly)?.size()?;
            Ok(SegmentInfo { id, size })
        })
        .collect()
}
