//! Where a log's segments and index live.
//!
//! A [`LogMedium`] hands out storage backends for segment files and the index
//! file, and arbitrates the single-writer lease. [`crate::dir::LogDir`] is the
//! on-disk medium; [`MemoryMedium`] keeps everything in memory for tests and
//! ephemeral logs.

use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use fs2::FileExt;
use parking_lot::Mutex;
use seqlog_storage::{InMemoryBackend, StorageBackend};
use std::collections::BTreeMap;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a backend is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Reader handle. Never creates anything.
    ReadOnly,
    /// Writer handle. Creates the target if missing.
    ReadWrite,
}

/// Storage location for one log.
pub trait LogMedium: Send + Sync {
    /// Lists existing segment IDs in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the IDs are not contiguous from 0.
    fn segment_ids(&self) -> CoreResult<Vec<SegmentId>>;

    /// Opens a segment backend.
    ///
    /// # Errors
    ///
    /// Fails if the segment is missing and `mode` is `ReadOnly`, or on I/O errors.
    fn open_segment(&self, id: SegmentId, mode: AccessMode) -> CoreResult<Box<dyn StorageBackend>>;

    /// Opens the index backend. Returns `None` if it does not exist yet and
    /// `mode` is `ReadOnly`.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    fn open_index(&self, mode: AccessMode) -> CoreResult<Option<Box<dyn StorageBackend>>>;

    /// Takes the single-writer lease.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyOwned` if another appender holds it.
    fn acquire(&self) -> CoreResult<WriterLease>;
}

/// Proof of exclusive write access. Released on drop.
#[derive(Debug)]
pub struct WriterLease {
    kind: LeaseKind,
}

#[derive(Debug)]
enum LeaseKind {
    File(File),
    Flag(Arc<AtomicBool>),
}

impl WriterLease {
    /// Wraps a lock file that already holds an exclusive lock.
    pub(crate) fn locked_file(file: File) -> Self {
        Self {
            kind: LeaseKind::File(file),
        }
    }

    /// Claims an in-process ownership flag.
    pub(crate) fn claim_flag(flag: &Arc<AtomicBool>) -> CoreResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CoreError::AlreadyOwned)?;
        Ok(Self {
            kind: LeaseKind::Flag(Arc::clone(flag)),
        })
    }
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        match &self.kind {
            // Closing the descriptor releases the lock anyway
            LeaseKind::File(file) => {
                let _ = FileExt::unlock(file);
            }
            LeaseKind::Flag(flag) => flag.store(false, Ordering::Release),
        }
    }
}

/// An in-memory log medium.
///
/// Clones share the same segments and index, the way several processes share
/// a directory.
///
/// # Example
///
/// ```rust
/// use seqlog_core::{Appender, LogConfig, MemoryMedium, StartPosition, Tailer};
///
/// let medium = MemoryMedium::new();
/// let appender = Appender::open_in_memory(medium.clone(), LogConfig::default()).unwrap();
/// appender.append(b"hello").unwrap();
///
/// let mut tailer = Tailer::open_in_memory(medium, StartPosition::Beginning).unwrap();
/// assert_eq!(tailer.poll().unwrap().unwrap().payload, b"hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    segments: Mutex<BTreeMap<SegmentId, InMemoryBackend>>,
    index: Mutex<Option<InMemoryBackend>>,
    owned: Arc<AtomicBool>,
}

impl MemoryMedium {
    /// Creates an empty medium.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of a segment's bytes.
    #[must_use]
    pub fn segment_data(&self, id: SegmentId) -> Option<Vec<u8>> {
        self.inner.segments.lock().get(&id).map(InMemoryBackend::data)
    }

    /// Returns a copy of the index bytes.
    #[must_use]
    pub fn index_data(&self) -> Option<Vec<u8>> {
        self.inner.index.lock().as_ref().map(InMemoryBackend::data)
    }

    /// Cuts a segment down to `len` bytes, simulating a torn write.
    ///
    /// # Errors
    ///
    /// Fails if the segment does not exist or `len` exceeds its size.
    pub fn truncate_segment(&self, id: SegmentId, len: u64) -> CoreResult<()> {
        let mut segments = self.inner.segments.lock();
        let backend = segments
            .get_mut(&id)
            .ok_or_else(|| CoreError::invalid_operation(format!("no such segment {id}")))?;
        backend.truncate(len)?;
        Ok(())
    }

    /// Cuts the index down to `len` bytes, simulating lost entries.
    ///
    /// # Errors
    ///
    /// Fails if the index does not exist or `len` exceeds its size.
    pub fn truncate_index(&self, len: u64) -> CoreResult<()> {
        let mut index = self.inner.index.lock();
        let backend = index
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("index does not exist"))?;
        backend.truncate(len)?;
        Ok(())
    }
}

impl LogMedium for MemoryMedium {
    fn segment_ids(&self) -> CoreResult<Vec<SegmentId>> {
        let ids: Vec<SegmentId> = self.inner.segments.lock().keys().copied().collect();
        check_contiguous(&ids)?;
        Ok(ids)
    }

    fn open_segment(&self, id: SegmentId, mode: AccessMode) -> CoreResult<Box<dyn StorageBackend>> {
        let mut segments = self.inner.segments.lock();
        let backend = match mode {
            AccessMode::ReadWrite => segments.entry(id).or_default().clone(),
            AccessMode::ReadOnly => segments.get(&id).cloned().ok_or_else(|| {
                CoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("segment {id} not found"),
                ))
            })?,
        };
        Ok(Box::new(backend))
    }

    fn open_index(&self, mode: AccessMode) -> CoreResult<Option<Box<dyn StorageBackend>>> {
        let mut index = self.inner.index.lock();
        if mode == AccessMode::ReadWrite && index.is_none() {
            *index = Some(InMemoryBackend::new());
        }
        Ok(index
            .as_ref()
            .map(|backend| Box::new(backend.clone()) as Box<dyn StorageBackend>))
    }

    fn acquire(&self) -> CoreResult<WriterLease> {
        WriterLease::claim_flag(&self.inner.owned)
    }
}

/// Verifies segment IDs run 0, 1, 2, ... without gaps.
pub(crate) fn check_contiguous(ids: &[SegmentId]) -> CoreResult<()> {
    for (expected, id) in ids.iter().enumerate() {
        if id.as_u32() as usize != expected {
            return Err(CoreError::invalid_format(format!(
                "missing segment seg:{expected} (found {id})"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_lease_is_exclusive() {
        let medium = MemoryMedium::new();
        let lease = medium.acquire().unwrap();
        assert!(matches!(medium.clone().acquire(), Err(CoreError::AlreadyOwned)));

        drop(lease);
        assert!(medium.acquire().is_ok());
    }

    #[test]
    fn clones_share_segments() {
        let medium = MemoryMedium::new();
        let mut writer = medium.open_segment(SegmentId::new(0), AccessMode::ReadWrite).unwrap();
        writer.append(b"abc").unwrap();

        let reader = medium
            .clone()
            .open_segment(SegmentId::new(0), AccessMode::ReadOnly)
            .unwrap();
        assert_eq!(reader.read_at(0, 3).unwrap(), b"abc");
        assert_eq!(medium.segment_data(SegmentId::new(0)).unwrap(), b"abc");
    }

    #[test]
    fn read_only_open_does_not_create() {
        let medium = MemoryMedium::new();
        assert!(medium.open_segment(SegmentId::new(0), AccessMode::ReadOnly).is_err());
        assert!(medium.open_index(AccessMode::ReadOnly).unwrap().is_none());
        assert!(medium.segment_ids().unwrap().is_empty());
    }

    #[test]
    fn gap_in_segment_ids_is_invalid() {
        let ids = [SegmentId::new(0), SegmentId::new(2)];
        assert!(matches!(
            check_contiguous(&ids),
            Err(CoreError::InvalidFormat { .. })
        ));
        assert!(check_contiguous(&[SegmentId::new(0), SegmentId::new(1)]).is_ok());
    }
}
