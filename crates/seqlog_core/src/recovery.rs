//! Crash recovery.
//!
//! Runs when an appender opens a log. After an unclean shutdown the index and
//! the tail segment may end in partially written data, and the index may lag
//! behind the segments because index entries are synced lazily.
//!
//! Recovery proceeds in three steps:
//!
//! 1. Drop a torn trailing index entry (file length not a multiple of 16).
//! 2. Walk index entries backwards until one points at a complete frame of
//!    the recorded length, and drop the entries after it.
//! 3. Scan forward from the end of that frame, frame by frame and across
//!    segments, re-indexing every complete frame. The first incomplete or
//!    impossible frame in the last segment is the new end of the log; the
//!    bytes from there on are truncated. In a sealed segment the same
//!    condition marks bytes abandoned by a failed write, and the scan moves
//!    on to the next segment.
//!
//! A crash therefore loses at most the record being written. Frames before
//! the boundary keep their indices.

use crate::codec::{self, FRAME_HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexEntry, IndexTable, INDEX_ENTRY_SIZE};
use crate::medium::{AccessMode, LogMedium};
use seqlog_storage::StorageBackend;
use tracing::{debug, warn};

/// What recovery found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records in the log after recovery.
    pub records: u64,
    /// Segments in the log after recovery.
    pub segments: usize,
    /// Bytes of a torn trailing index entry that were dropped.
    pub torn_index_bytes: u64,
    /// Index entries dropped because their frame was incomplete.
    pub dropped_entries: u64,
    /// Index entries recreated from complete but unindexed frames.
    pub rebuilt_entries: u64,
    /// Bytes cut from the end of the last segment.
    pub truncated_bytes: u64,
    /// Bytes skipped in sealed segments.
    pub skipped_bytes: u64,
}

impl RecoveryReport {
    /// Returns true if recovery changed nothing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.torn_index_bytes == 0
            && self.dropped_entries == 0
            && self.rebuilt_entries == 0
            && self.truncated_bytes == 0
            && self.skipped_bytes == 0
    }
}

/// Result of looking for a frame during the forward scan.
enum Scan {
    /// A complete frame with this payload length.
    Frame(u32),
    /// The segment ends exactly here.
    End,
    /// Incomplete or impossible bytes.
    Torn(&'static str),
}

/// Brings a medium back to a consistent state and returns its index.
///
/// Must only run while holding the writer lease.
///
/// # Errors
///
/// Fails on I/O errors or if the segment layout is invalid.
pub fn recover(medium: &dyn LogMedium, max_payload: u32) -> CoreResult<(IndexTable, RecoveryReport)> {
    let ids = medium.segment_ids()?;
    let mut segments = Vec::with_capacity(ids.len());
    let mut sizes = Vec::with_capacity(ids.len());
    for id in &ids {
        let backend = medium.open_segment(*id, AccessMode::ReadWrite)?;
        sizes.push(backend.size()?);
        segments.push(backend);
    }

    let index_backend = medium
        .open_index(AccessMode::ReadWrite)?
        .ok_or_else(|| CoreError::invalid_operation("index was not created"))?;
    let index_bytes = index_backend.size()?;
    let mut index = IndexTable::open(index_backend)?;
    let mut report = RecoveryReport::default();

    let torn = index_bytes % INDEX_ENTRY_SIZE as u64;
    if torn != 0 {
        warn!(bytes = torn, "dropping torn index entry");
        index.truncate_to(index.len())?;
        report.torn_index_bytes = torn;
    }

    let indexed = index.len();
    let mut valid = indexed;
    while valid > 0 {
        let entry = index.lookup(valid - 1)?;
        if frame_matches(&segments, &sizes, &entry)? {
            break;
        }
        valid -= 1;
    }
    if valid < indexed {
        warn!(
            dropped = indexed - valid,
            records = valid,
            "dropping index entries without a complete frame"
        );
        index.truncate_to(valid)?;
        report.dropped_entries = indexed - valid;
    }

    let (mut seg, mut offset) = match index.highest_index() {
        Some(last) => {
            let entry = index.lookup(last)?;
            (entry.segment_id.as_u32() as usize, entry.end())
        }
        None => (0, 0),
    };

    while seg < segments.len() {
        let size = sizes[seg];
        match scan_frame(segments[seg].as_ref(), offset, size, max_payload)? {
            Scan::Frame(length) => {
                let entry = IndexEntry {
                    segment_id: ids[seg],
                    offset,
                    length,
                };
                index.append(index.len(), entry)?;
                report.rebuilt_entries += 1;
                offset = entry.end();
            }
            Scan::End => {
                seg += 1;
                offset = 0;
            }
            Scan::Torn(reason) if seg + 1 == segments.len() => {
                warn!(
                    segment = %ids[seg],
                    offset,
                    bytes = size - offset,
                    reason,
                    "truncating partially written tail record"
                );
                segments[seg].truncate(offset)?;
                sizes[seg] = offset;
                report.truncated_bytes = size - offset;
                break;
            }
            Scan::Torn(reason) => {
                warn!(
                    segment = %ids[seg],
                    offset,
                    bytes = size - offset,
                    reason,
                    "skipping abandoned bytes in sealed segment"
                );
                report.skipped_bytes += size - offset;
                seg += 1;
                offset = 0;
            }
        }
    }

    if report.rebuilt_entries > 0 {
        debug!(rebuilt = report.rebuilt_entries, "re-indexed unindexed frames");
    }

    if let Some(tail) = segments.last_mut() {
        tail.sync()?;
    }
    index.sync()?;

    report.records = index.len();
    report.segments = ids.len();
    Ok((index, report))
}

/// Checks that an index entry points at a complete frame of the recorded
/// length.
fn frame_matches(
    segments: &[Box<dyn StorageBackend>],
    sizes: &[u64],
    entry: &IndexEntry,
) -> CoreResult<bool> {
    let slot = entry.segment_id.as_u32() as usize;
    let (Some(segment), Some(&size)) = (segments.get(slot), sizes.get(slot)) else {
        return Ok(false);
    };
    if entry.end() > size {
        return Ok(false);
    }

    let header = segment.read_at(entry.offset, FRAME_HEADER_SIZE)?;
    Ok(codec::declared_len(&header) == Some(entry.length))
}

fn scan_frame(
    segment: &dyn StorageBackend,
    offset: u64,
    size: u64,
    max_payload: u32,
) -> CoreResult<Scan> {
    if offset >= size {
        return Ok(Scan::End);
    }

    let remaining = size - offset;
    if remaining < FRAME_HEADER_SIZE as u64 {
        return Ok(Scan::Torn("partial frame header"));
    }

    let header = segment.read_at(offset, FRAME_HEADER_SIZE)?;
    let Some(declared) = codec::declared_len(&header) else {
        return Ok(Scan::Torn("partial frame header"));
    };
    if declared > max_payload {
        return Ok(Scan::Torn("declared length exceeds maximum payload"));
    }
    if codec::framed_len(declared) > remaining {
        return Ok(Scan::Torn("partial payload"));
    }

    Ok(Scan::Frame(declared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appender::Appender;
    use crate::config::LogConfig;
    use crate::medium::MemoryMedium;
    use crate::types::SegmentId;

    fn seeded(payloads: &[&[u8]], config: LogConfig) -> MemoryMedium {
        let medium = MemoryMedium::new();
        let appender = Appender::open_in_memory(medium.clone(), config).unwrap();
        for payload in payloads {
            appender.append(payload).unwrap();
        }
        appender.close().unwrap();
        medium
    }

    fn recover_memory(medium: &MemoryMedium) -> (IndexTable, RecoveryReport) {
        recover(medium, 1024).unwrap()
    }

    #[test]
    fn clean_log_is_untouched() {
        let medium = seeded(&[b"a", b"bb", b"ccc"], LogConfig::default());
        let (index, report) = recover_memory(&medium);

        assert!(report.is_clean());
        assert_eq!(report.records, 3);
        assert_eq!(index.highest_index(), Some(2));
    }

    #[test]
    fn torn_tail_record_is_truncated() {
        let medium = seeded(&[b"a", b"bb", b"ccc"], LogConfig::default());
        // a = 5 bytes, bb = 6 bytes, ccc header + 1 payload byte
        medium.truncate_segment(SegmentId::new(0), 16).unwrap();

        let (index, report) = recover_memory(&medium);
        assert_eq!(report.dropped_entries, 1);
        assert_eq!(report.truncated_bytes, 5);
        assert_eq!(index.highest_index(), Some(1));
        assert_eq!(medium.segment_data(SegmentId::new(0)).unwrap().len(), 11);
    }

    #[test]
    fn torn_index_entry_is_rebuilt_from_segment() {
        let medium = seeded(&[b"a", b"bb", b"ccc"], LogConfig::default());
        medium.truncate_index(40).unwrap();

        let (index, report) = recover_memory(&medium);
        assert_eq!(report.torn_index_bytes, 8);
        assert_eq!(report.rebuilt_entries, 1);
        assert_eq!(report.records, 3);
        assert_eq!(
            index.lookup(2).unwrap(),
            IndexEntry {
                segment_id: SegmentId::new(0),
                offset: 11,
                length: 3
            }
        );
    }

    #[test]
    fn lost_index_is_rebuilt_across_segments() {
        let config = LogConfig::default()
            .segment_capacity_bytes(16)
            .max_payload_bytes(8);
        let medium = seeded(&[b"aaaa", b"bbbb", b"cccc"], config);
        medium.truncate_index(0).unwrap();

        let (index, report) = recover(&medium, 8).unwrap();
        assert_eq!(report.rebuilt_entries, 3);
        assert_eq!(report.segments, 2);
        assert_eq!(index.lookup(2).unwrap().segment_id, SegmentId::new(1));
    }

    #[test]
    fn abandoned_bytes_in_sealed_segment_are_skipped() {
        let medium = MemoryMedium::new();
        let mut first = medium
            .open_segment(SegmentId::new(0), AccessMode::ReadWrite)
            .unwrap();
        first.append(&codec::encode(b"a", 16).unwrap()).unwrap();
        first.append(&[9, 0]).unwrap();
        let mut second = medium
            .open_segment(SegmentId::new(1), AccessMode::ReadWrite)
            .unwrap();
        second.append(&codec::encode(b"b", 16).unwrap()).unwrap();

        let (index, report) = recover(&medium, 16).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.skipped_bytes, 2);
        assert_eq!(report.truncated_bytes, 0);
        assert_eq!(index.lookup(1).unwrap().segment_id, SegmentId::new(1));
    }

    #[test]
    fn impossible_length_in_tail_is_truncated() {
        let medium = seeded(&[b"a"], LogConfig::default());
        let mut tail = medium
            .open_segment(SegmentId::new(0), AccessMode::ReadWrite)
            .unwrap();
        tail.append(&u32::MAX.to_le_bytes()).unwrap();
        tail.append(&[0; 8]).unwrap();

        let (_, report) = recover_memory(&medium);
        assert_eq!(report.records, 1);
        assert_eq!(report.truncated_bytes, 12);
    }

    #[test]
    fn empty_medium_recovers_empty() {
        let medium = MemoryMedium::new();
        let (index, report) = recover_memory(&medium);
        assert!(index.is_empty());
        assert!(report.is_clean());
        assert_eq!(report.segments, 0);
    }
}
