//! Log directory management.
//!
//! This module handles the file system layout of a log:
//!
//! ```text
//! <log_path>/
//! ├─ LOCK                     # Advisory lock held by the appender
//! ├─ index.dat                # Dense 16-byte index entries
//! └─ segments/
//!    ├─ seg-0000000000.dat    # Framed records, one file per segment
//!    └─ seg-0000000001.dat
//! ```
//!
//! The LOCK file ensures only one appender, in any process, extends the log.
//! Tailers open the same directory without touching the lock.

use crate::error::{CoreError, CoreResult};
use crate::medium::{check_contiguous, AccessMode, LogMedium, WriterLease};
use crate::types::SegmentId;
use fs2::FileExt;
use seqlog_storage::{FileBackend, StorageBackend};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names within the log directory.
const LOCK_FILE: &str = "LOCK";
const INDEX_FILE: &str = "index.dat";
const SEGMENTS_DIR: &str = "segments";
const SEGMENT_PREFIX: &str = "seg-";
const SEGMENT_SUFFIX: &str = ".dat";

/// An on-disk log directory.
///
/// Opening a `LogDir` takes no lock. The appender takes the lock through
/// [`LogMedium::acquire`].
///
/// # Example
///
/// ```rust,ignore
/// use seqlog_core::dir::LogDir;
/// use std::path::Path;
///
/// let dir = LogDir::open(Path::new("queue"), true)?;
/// println!("index: {:?}", dir.index_path());
/// ```
#[derive(Debug, Clone)]
pub struct LogDir {
    /// Root directory path.
    path: PathBuf,
}

impl LogDir {
    /// Opens or creates a log directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false (`LogNotFound`)
    /// - The path exists but is not a directory (`InvalidFormat`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path.join(SEGMENTS_DIR))?;
                debug!(path = %path.display(), "created log directory");
            } else {
                return Err(CoreError::LogNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        if create_if_missing && !path.join(SEGMENTS_DIR).exists() {
            fs::create_dir_all(path.join(SEGMENTS_DIR))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Returns the path to the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the index file.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.path.join(INDEX_FILE)
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.path.join(LOCK_FILE)
    }

    /// Returns the path to the segments directory.
    #[must_use]
    pub fn segments_dir(&self) -> PathBuf {
        self.path.join(SEGMENTS_DIR)
    }

    /// Returns the path to a specific segment file.
    ///
    /// Names are fixed-width so they sort lexicographically in segment order
    /// (segment 1 is `seg-0000000001.dat`).
    #[must_use]
    pub fn segment_path(&self, id: SegmentId) -> PathBuf {
        self.segments_dir().join(segment_file_name(id))
    }

    /// Syncs the segments directory so created or removed entries are durable.
    #[cfg(unix)]
    fn sync_segments_directory(&self) -> CoreResult<()> {
        let dir = File::open(self.segments_dir())?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_segments_directory(&self) -> CoreResult<()> {
        // Windows NTFS journal provides metadata durability guarantees
        Ok(())
    }
}

impl LogMedium for LogDir {
    fn segment_ids(&self) -> CoreResult<Vec<SegmentId>> {
        let segments_dir = self.segments_dir();
        if !segments_dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&segments_dir)? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(parse_segment_file_name) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        check_contiguous(&ids)?;
        Ok(ids)
    }

    fn open_segment(&self, id: SegmentId, mode: AccessMode) -> CoreResult<Box<dyn StorageBackend>> {
        let path = self.segment_path(id);
        let backend = match mode {
            AccessMode::ReadOnly => FileBackend::open_read_only(&path)?,
            AccessMode::ReadWrite => {
                let created = !path.exists();
                let backend = FileBackend::open_with_create_dirs(&path)?;
                if created {
                    self.sync_segments_directory()?;
                    debug!(segment = %id, "created segment file");
                }
                backend
            }
        };
        Ok(Box::new(backend))
    }

    fn open_index(&self, mode: AccessMode) -> CoreResult<Option<Box<dyn StorageBackend>>> {
        let path = self.index_path();
        let backend = match mode {
            AccessMode::ReadOnly if !path.exists() => return Ok(None),
            AccessMode::ReadOnly => FileBackend::open_read_only(&path)?,
            AccessMode::ReadWrite => FileBackend::open(&path)?,
        };
        Ok(Some(Box::new(backend)))
    }

    fn acquire(&self) -> CoreResult<WriterLease> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;

        // Non-blocking: a second appender fails fast
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::AlreadyOwned);
        }

        Ok(WriterLease::locked_file(lock_file))
    }
}

fn segment_file_name(id: SegmentId) -> String {
    format!("{SEGMENT_PREFIX}{:010}{SEGMENT_SUFFIX}", id.as_u32())
}

fn parse_segment_file_name(name: &str) -> Option<SegmentId> {
    let digits = name.strip_prefix(SEGMENT_PREFIX)?.strip_suffix(SEGMENT_SUFFIX)?;
    if digits.len() != 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(SegmentId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let log_path = temp.path().join("queue");

        assert!(!log_path.exists());

        let dir = LogDir::open(&log_path, true).unwrap();
        assert!(log_path.is_dir());
        assert!(dir.segments_dir().is_dir());
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let result = LogDir::open(&temp.path().join("nonexistent"), false);
        assert!(matches!(result, Err(CoreError::LogNotFound { .. })));
    }

    #[test]
    fn lock_prevents_second_appender() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();

        let _lease = dir.acquire().unwrap();

        let other = LogDir::open(temp.path(), true).unwrap();
        assert!(matches!(other.acquire(), Err(CoreError::AlreadyOwned)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();

        {
            let _lease = dir.acquire().unwrap();
        }

        assert!(dir.acquire().is_ok());
    }

    #[test]
    fn segment_names_sort_in_order() {
        assert_eq!(segment_file_name(SegmentId::new(1)), "seg-0000000001.dat");
        assert!(segment_file_name(SegmentId::new(9)) < segment_file_name(SegmentId::new(10)));
        assert_eq!(
            parse_segment_file_name("seg-0000000042.dat"),
            Some(SegmentId::new(42))
        );
        assert_eq!(parse_segment_file_name("seg-42.dat"), None);
        assert_eq!(parse_segment_file_name("index.dat"), None);
    }

    #[test]
    fn segment_ids_lists_created_segments() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();
        assert!(dir.segment_ids().unwrap().is_empty());

        dir.open_segment(SegmentId::new(0), AccessMode::ReadWrite).unwrap();
        dir.open_segment(SegmentId::new(1), AccessMode::ReadWrite).unwrap();
        fs::write(dir.segments_dir().join("notes.txt"), b"ignored").unwrap();

        assert_eq!(
            dir.segment_ids().unwrap(),
            vec![SegmentId::new(0), SegmentId::new(1)]
        );
    }

    #[test]
    fn missing_segment_is_invalid_format() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();
        dir.open_segment(SegmentId::new(0), AccessMode::ReadWrite).unwrap();
        dir.open_segment(SegmentId::new(2), AccessMode::ReadWrite).unwrap();

        assert!(matches!(
            dir.segment_ids(),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn read_only_index_absent_until_created() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();

        assert!(dir.open_index(AccessMode::ReadOnly).unwrap().is_none());
        dir.open_index(AccessMode::ReadWrite).unwrap();
        assert!(dir.open_index(AccessMode::ReadOnly).unwrap().is_some());
    }

    #[test]
    fn paths_are_correct() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();

        assert_eq!(dir.index_path(), temp.path().join("index.dat"));
        assert_eq!(dir.lock_path(), temp.path().join("LOCK"));
        assert_eq!(
            dir.segment_path(SegmentId::new(3)),
            temp.path().join("segments").join("seg-0000000003.dat")
        );
    }
}
