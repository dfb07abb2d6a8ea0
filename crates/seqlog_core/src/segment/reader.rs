//! Reader-side segment access.

use crate::codec::{self, FRAME_HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexEntry;
use crate::medium::{AccessMode, LogMedium};
use crate::types::SegmentId;
use seqlog_storage::{StorageBackend, StorageError};
use std::sync::Arc;

/// Reads frames out of segments without taking any writer lock.
///
/// Keeps the most recently used segment open, since tailers read segments
/// front to back.
pub struct SegmentReader {
    medium: Arc<dyn LogMedium>,
    current: Option<(SegmentId, Box<dyn StorageBackend>)>,
}

impl SegmentReader {
    /// Creates a reader over a medium.
    #[must_use]
    pub fn new(medium: Arc<dyn LogMedium>) -> Self {
        Self {
            medium,
            current: None,
        }
    }

    /// Reads the frame at `offset`, trusting only bytes below `high_water`.
    ///
    /// Returns `Ok(None)` (not yet written) when `offset` is at or past the
    /// high-water mark. Returns the payload and the offset of the next frame
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns `CorruptFrame` if the frame crosses the high-water mark or the
    /// segment ends before it.
    pub fn read_at(
        &mut self,
        segment_id: SegmentId,
        offset: u64,
        high_water: u64,
    ) -> CoreResult<Option<(Vec<u8>, u64)>> {
        if offset >= high_water {
            return Ok(None);
        }

        let available = usize::try_from(high_water - offset).unwrap_or(usize::MAX);
        if available < FRAME_HEADER_SIZE {
            return Err(CoreError::corrupt_frame(
                segment_id,
                offset,
                "frame header crosses the high-water mark",
            ));
        }

        let header = self.read_bytes(segment_id, offset, FRAME_HEADER_SIZE)?;
        let declared = codec::declared_len(&header).unwrap_or(0);
        let end = offset + codec::framed_len(declared);
        if end > high_water {
            return Err(CoreError::corrupt_frame(
                segment_id,
                offset,
                format!("declared length {declared} crosses the high-water mark {high_water}"),
            ));
        }

        let payload = self.read_bytes(
            segment_id,
            offset + FRAME_HEADER_SIZE as u64,
            declared as usize,
        )?;
        Ok(Some((payload, end)))
    }

    /// Reads the payload an index entry points at.
    ///
    /// # Errors
    ///
    /// Returns `CorruptFrame` if the bytes do not form exactly the frame the
    /// entry describes.
    pub fn read_entry(&mut self, entry: &IndexEntry) -> CoreResult<Vec<u8>> {
        let Some((payload, _)) = self.read_at(entry.segment_id, entry.offset, entry.end())? else {
            return Err(CoreError::corrupt_frame(
                entry.segment_id,
                entry.offset,
                "index entry points at nothing",
            ));
        };

        if payload.len() != entry.length as usize {
            return Err(CoreError::corrupt_frame(
                entry.segment_id,
                entry.offset,
                format!(
                    "frame holds {} bytes, index entry says {}",
                    payload.len(),
                    entry.length
                ),
            ));
        }

        Ok(payload)
    }

    fn read_bytes(&mut self, segment_id: SegmentId, offset: u64, len: usize) -> CoreResult<Vec<u8>> {
        let backend = self.segment(segment_id, offset)?;
        match backend.read_at(offset, len) {
            Ok(bytes) => Ok(bytes),
            Err(StorageError::ReadPastEnd { size, .. }) => Err(CoreError::corrupt_frame(
                segment_id,
                offset,
                format!("segment ends at {size} before the published frame"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn segment(&mut self, segment_id: SegmentId, offset: u64) -> CoreResult<&dyn StorageBackend> {
        let cached = matches!(&self.current, Some((id, _)) if *id == segment_id);
        if !cached {
            let backend = match self.medium.open_segment(segment_id, AccessMode::ReadOnly) {
                Ok(backend) => backend,
                Err(CoreError::Io(e)) | Err(CoreError::Storage(StorageError::Io(e)))
                    if e.kind() == std::io::ErrorKind::NotFound =>
                {
                    return Err(CoreError::corrupt_frame(
                        segment_id,
                        offset,
                        "segment file is missing",
                    ));
                }
                Err(e) => return Err(e),
            };
            self.current = Some((segment_id, backend));
        }

        match &self.current {
            Some((_, backend)) => Ok(backend.as_ref()),
            None => Err(CoreError::invalid_operation("segment cache empty")),
        }
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("current", &self.current.as_ref().map(|(id, _)| *id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MemoryMedium;

    fn medium_with(frames: &[&[u8]]) -> MemoryMedium {
        let medium = MemoryMedium::new();
        let mut segment = medium
            .open_segment(SegmentId::new(0), AccessMode::ReadWrite)
            .unwrap();
        for payload in frames {
            segment.append(&codec::encode(payload, 64).unwrap()).unwrap();
        }
        medium
    }

    #[test]
    fn reads_frames_in_order() {
        let medium = medium_with(&[b"a", b"bb"]);
        let mut reader = SegmentReader::new(Arc::new(medium));

        let (first, next) = reader.read_at(SegmentId::new(0), 0, 11).unwrap().unwrap();
        assert_eq!(first, b"a");
        assert_eq!(next, 5);

        let (second, next) = reader.read_at(SegmentId::new(0), next, 11).unwrap().unwrap();
        assert_eq!(second, b"bb");
        assert_eq!(reader.read_at(SegmentId::new(0), next, 11).unwrap(), None);
    }

    #[test]
    fn bytes_past_high_water_are_not_yet_written() {
        let medium = medium_with(&[b"a", b"bb"]);
        let mut reader = SegmentReader::new(Arc::new(medium));

        assert_eq!(reader.read_at(SegmentId::new(0), 5, 5).unwrap(), None);
        assert!(matches!(
            reader.read_at(SegmentId::new(0), 5, 8),
            Err(CoreError::CorruptFrame { offset: 5, .. })
        ));
    }

    #[test]
    fn read_entry_checks_length() {
        let medium = medium_with(&[b"abc"]);
        let mut reader = SegmentReader::new(Arc::new(medium));

        let good = IndexEntry {
            segment_id: SegmentId::new(0),
            offset: 0,
            length: 3,
        };
        assert_eq!(reader.read_entry(&good).unwrap(), b"abc");

        let wrong = IndexEntry { length: 2, ..good };
        assert!(matches!(
            reader.read_entry(&wrong),
            Err(CoreError::CorruptFrame { .. })
        ));
    }

    #[test]
    fn truncated_segment_is_corrupt() {
        let medium = medium_with(&[b"hello"]);
        medium.truncate_segment(SegmentId::new(0), 6).unwrap();
        let mut reader = SegmentReader::new(Arc::new(medium));

        let entry = IndexEntry {
            segment_id: SegmentId::new(0),
            offset: 0,
            length: 5,
        };
        assert!(matches!(
            reader.read_entry(&entry),
            Err(CoreError::CorruptFrame { .. })
        ));
    }

    #[test]
    fn missing_segment_is_corrupt() {
        let mut reader = SegmentReader::new(Arc::new(MemoryMedium::new()));
        let entry = IndexEntry {
            segment_id: SegmentId::new(3),
            offset: 0,
            length: 1,
        };
        assert!(matches!(
            reader.read_entry(&entry),
            Err(CoreError::CorruptFrame { .. })
        ));
    }
}
