//! Dense record index.
//!
//! The index file is an array of fixed-width entries. The entry for record
//! `i` lives at byte `i * 16`:
//!
//! ```text
//! | segment_id (4, u32 LE) | offset (8, u64 LE) | length (4, u32 LE) |
//! ```
//!
//! `length` is the payload length, so an entry covers the frame
//! `offset..offset + 4 + length` of its segment.
//!
//! Appending an entry is the point at which a record becomes visible to
//! tailers in other processes. A reader counts only whole entries, so a
//! partially written entry is invisible.

use crate::codec::framed_len;
use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use seqlog_storage::StorageBackend;
use tracing::warn;

/// Size of one index entry in bytes.
pub const INDEX_ENTRY_SIZE: usize = 16;

/// Physical location of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Segment holding the frame.
    pub segment_id: SegmentId,
    /// Byte offset of the frame header within the segment.
    pub offset: u64,
    /// Payload length.
    pub length: u32,
}

impl IndexEntry {
    /// Encodes the entry into its on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; INDEX_ENTRY_SIZE] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        buf[0..4].copy_from_slice(&self.segment_id.as_u32().to_le_bytes());
        buf[4..12].copy_from_slice(&self.offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Decodes an entry.
    #[must_use]
    pub fn decode(buf: &[u8; INDEX_ENTRY_SIZE]) -> Self {
        let mut segment_id = [0u8; 4];
        let mut offset = [0u8; 8];
        let mut length = [0u8; 4];
        segment_id.copy_from_slice(&buf[0..4]);
        offset.copy_from_slice(&buf[4..12]);
        length.copy_from_slice(&buf[12..16]);

        Self {
            segment_id: SegmentId::new(u32::from_le_bytes(segment_id)),
            offset: u64::from_le_bytes(offset),
            length: u32::from_le_bytes(length),
        }
    }

    /// Returns the offset just past this entry's frame.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + framed_len(self.length)
    }
}

/// The index table over one index file.
///
/// Writers append through [`IndexTable::append`]; readers call
/// [`IndexTable::refresh`] to pick up entries appended by the writer.
pub struct IndexTable {
    backend: Box<dyn StorageBackend>,
    /// Number of whole entries known to this handle.
    count: u64,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
}

impl IndexTable {
    /// Wraps an index backend. Trailing bytes that do not form a whole entry
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the backend size cannot be read.
    pub fn open(backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let count = backend.size()? / INDEX_ENTRY_SIZE as u64;
        Ok(Self {
            backend,
            count,
            poisoned: false,
        })
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the most recent index, or `None` if the table is empty.
    #[must_use]
    pub fn highest_index(&self) -> Option<u64> {
        self.count.checked_sub(1)
    }

    /// Size of the backing file in bytes, including any torn tail.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be read.
    pub fn byte_len(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Appends the entry for record `index`.
    ///
    /// Once this returns `Ok` the entry is visible to readers and its index
    /// is taken for good. On failure the table is rolled back to its previous
    /// length; a partial entry is never counted by readers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `index` is not the next index and
    /// `WriteFailed` on I/O failure.
    pub fn append(&mut self, index: u64, entry: IndexEntry) -> CoreResult<()> {
        if self.poisoned {
            return Err(CoreError::write_failed(std::io::Error::new(
                std::io::ErrorKind::Other,
                "index is unusable after a failed rollback",
            )));
        }
        if index != self.count {
            return Err(CoreError::invalid_operation(format!(
                "index entry {index} appended out of order, expected {}",
                self.count
            )));
        }

        if let Err(e) = self.backend.append(&entry.encode()) {
            self.rollback_to(self.count);
            return Err(CoreError::write_failed(e));
        }

        self.count += 1;
        Ok(())
    }

    /// Pushes appended entries to the operating system.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the flush fails. Entries already appended
    /// stay in the table.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.backend.flush().map_err(CoreError::write_failed)
    }

    /// Looks up the location of record `index`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index` has no entry.
    pub fn lookup(&self, index: u64) -> CoreResult<IndexEntry> {
        if index >= self.count {
            return Err(CoreError::IndexOutOfRange {
                index,
                count: self.count,
            });
        }

        let bytes = self
            .backend
            .read_at(index * INDEX_ENTRY_SIZE as u64, INDEX_ENTRY_SIZE)?;
        let buf: [u8; INDEX_ENTRY_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::invalid_format("short index entry read"))?;
        Ok(IndexEntry::decode(&buf))
    }

    /// Re-reads the entry count from the medium. Returns the new count.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be read.
    pub fn refresh(&mut self) -> CoreResult<u64> {
        self.count = self.backend.refresh()? / INDEX_ENTRY_SIZE as u64;
        Ok(self.count)
    }

    /// Forces all entries to stable storage.
    ///
    /// # Errors
    ///
    /// Fails if the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Drops every entry at or after `count`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be truncated.
    pub fn truncate_to(&mut self, count: u64) -> CoreResult<()> {
        self.backend.truncate(count * INDEX_ENTRY_SIZE as u64)?;
        self.count = count.min(self.count);
        Ok(())
    }

    /// Best-effort truncation after a failed write. Poisons the table if the
    /// file cannot be cut back.
    pub(crate) fn rollback_to(&mut self, count: u64) {
        if let Err(e) = self.truncate_to(count) {
            warn!(count, error = %e, "index rollback failed, refusing further appends");
            self.poisoned = true;
        }
    }
}

impl std::fmt::Debug for IndexTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexTable")
            .field("count", &self.count)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}
