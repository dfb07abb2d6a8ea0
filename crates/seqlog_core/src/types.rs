//! Core type definitions for seqlog.

use std::fmt;

/// Identifier for a segment file.
///
/// Segment IDs start at 0, are contiguous, and increase by one on each
/// rollover. They are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SegmentId(pub u32);

impl SegmentId {
    /// Creates a new segment ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the ID of the segment created after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

/// A record delivered by a [`crate::Tailer`].
///
/// The payload is opaque; the log never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Global index assigned when the record was appended.
    pub index: u64,
    /// Payload bytes exactly as passed to `append`.
    pub payload: Vec<u8>,
}

impl Record {
    /// Creates a new record.
    #[must_use]
    pub fn new(index: u64, payload: Vec<u8>) -> Self {
        Self { index, payload }
    }
}

/// Where a tailer begins reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Index 0.
    Beginning,
    /// A specific, already published index.
    Index(u64),
    /// One past the highest published index, so only future records are seen.
    End,
}

impl fmt::Display for StartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginning => write!(f, "beginning"),
            Self::Index(index) => write!(f, "{index}"),
            Self::End => write!(f, "end"),
        }
    }
}

impl std::str::FromStr for StartPosition {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginning" | "start" => Ok(Self::Beginning),
            "end" => Ok(Self::End),
            other => other.parse::<u64>().map(Self::Index).map_err(|_| {
                crate::error::CoreError::invalid_config(format!(
                    "invalid start position '{s}', expected beginning, end or an index"
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_id_ordering() {
        let s1 = SegmentId::new(1);
        let s2 = s1.next();
        assert!(s1 < s2);
        assert_eq!(s2.as_u32(), 2);
    }

    #[test]
    fn segment_id_display() {
        assert_eq!(format!("{}", SegmentId::new(42)), "seg:42");
    }

    #[test]
    fn start_position_parse() {
        assert_eq!("beginning".parse::<StartPosition>().unwrap(), StartPosition::Beginning);
        assert_eq!("END".parse::<StartPosition>().unwrap(), StartPosition::End);
        assert_eq!("17".parse::<StartPosition>().unwrap(), StartPosition::Index(17));
        assert!("later".parse::<StartPosition>().is_err());
    }
}
