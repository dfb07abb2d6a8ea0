//! Error types for seqlog core.

use crate::types::SegmentId;
use seqlog_storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in seqlog core operations.
///
/// "No record yet" is not an error: [`crate::Tailer::poll`] reports it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Payload exceeds the configured maximum. Rejected before any write.
    #[error("payload of {len} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Length of the rejected payload.
        len: usize,
        /// Configured maximum payload size.
        max: u32,
    },

    /// Another appender holds the log.
    #[error("log is already owned by another appender")]
    AlreadyOwned,

    /// I/O failure while appending. The index was not advanced.
    #[error("append failed: {source}")]
    WriteFailed {
        /// Underlying storage failure.
        #[source]
        source: StorageError,
    },

    /// Bytes at a location an index entry claims is valid could not be parsed.
    #[error("corrupt frame in {segment_id} at offset {offset}: {reason}")]
    CorruptFrame {
        /// Segment holding the frame.
        segment_id: SegmentId,
        /// Byte offset of the frame within the segment.
        offset: u64,
        /// What was wrong with the frame.
        reason: String,
    },

    /// Index is beyond the highest published index.
    #[error("index {index} out of range: {count} records published")]
    IndexOutOfRange {
        /// The requested index.
        index: u64,
        /// Number of records published when the lookup ran.
        count: u64,
    },

    /// Configuration was rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// On-disk layout is not a valid log.
    #[error("invalid log format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// The log directory does not exist.
    #[error("log not found at {}", path.display())]
    LogNotFound {
        /// Path that was opened.
        path: PathBuf,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a corrupt frame error.
    pub fn corrupt_frame(segment_id: SegmentId, offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptFrame {
            segment_id,
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a write failed error.
    pub fn write_failed(source: impl Into<StorageError>) -> Self {
        Self::WriteFailed {
            source: source.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for conditions the caller is expected to handle as a
    /// normal result (bad input, out-of-range start, contention).
    ///
    /// `WriteFailed` and `CorruptFrame` are not recoverable here; whether to
    /// retry is the caller's decision.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge { .. } | Self::IndexOutOfRange { .. } | Self::AlreadyOwned
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_frame_display() {
        let err = CoreError::corrupt_frame(SegmentId::new(3), 128, "truncated");
        assert_eq!(err.to_string(), "corrupt frame in seg:3 at offset 128: truncated");
    }

    #[test]
    fn recoverable_classification() {
        assert!(CoreError::IndexOutOfRange { index: 5, count: 2 }.is_recoverable());
        assert!(CoreError::PayloadTooLarge { len: 10, max: 4 }.is_recoverable());
        assert!(!CoreError::corrupt_frame(SegmentId::new(0), 0, "x").is_recoverable());
        let io = io::Error::new(io::ErrorKind::Other, "disk gone");
        assert!(!CoreError::write_failed(io).is_recoverable());
    }
}
