//! Segment storage for records.
//!
//! A log's records live in a run of segment files. Each segment holds
//! consecutive framed records (see [`crate::codec`]) and never exceeds the
//! configured capacity. Exactly one segment, the tail, is writable; earlier
//! segments are sealed and never modified again.
//!
//! - [`SegmentStore`] is the writer side: allocation, rollover, and
//!   durability of the tail.
//! - [`SegmentReader`] is the reader side used by tailers and verification.

mod reader;
mod store;

pub use reader::SegmentReader;
pub use store::{Reservation, SegmentStore};

use crate::types::SegmentId;

/// Identity and size of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Segment ID.
    pub id: SegmentId,
    /// Bytes written to the segment.
    pub size: u64,
}
