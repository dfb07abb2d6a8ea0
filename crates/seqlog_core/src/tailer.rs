//! Independent read cursors.
//!
//! A [`Tailer`] follows the log without taking any lock. It learns about new
//! records by re-reading the index length, so it works the same whether the
//! appender lives in this process or another one.
//!
//! [`Tailer::poll`] never blocks. `Ok(None)` means the tailer has caught up
//! with the appender; the caller decides how long to wait before polling
//! again.

use crate::dir::LogDir;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexEntry, IndexTable};
use crate::medium::{AccessMode, LogMedium, MemoryMedium};
use crate::segment::SegmentReader;
use crate::types::{Record, SegmentId, StartPosition};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What the last poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    /// Caught up; waiting for the appender to publish the next index.
    AwaitingEntry,
    /// The last poll delivered a record.
    Delivered,
    /// A corrupt frame stopped this tailer for good.
    Failed,
}

/// Byte position of a tailer within the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Segment the next record is expected in.
    pub segment_id: SegmentId,
    /// Offset just past the last delivered frame.
    pub offset: u64,
}

impl Position {
    const START: Self = Self {
        segment_id: SegmentId(0),
        offset: 0,
    };
}

/// The corrupt frame that stopped a tailer.
#[derive(Debug, Clone)]
struct Fault {
    segment_id: SegmentId,
    offset: u64,
    reason: String,
}

impl Fault {
    fn to_error(&self) -> CoreError {
        CoreError::corrupt_frame(self.segment_id, self.offset, self.reason.clone())
    }
}

/// A read cursor over a log.
///
/// Each tailer owns its position; tailers never coordinate with each other
/// or with the appender.
///
/// # Example
///
/// ```rust,ignore
/// use seqlog_core::{StartPosition, Tailer};
/// use std::{thread, time::Duration};
///
/// let mut tailer = Tailer::open("queue", StartPosition::Beginning)?;
/// loop {
///     match tailer.poll()? {
///         Some(record) => println!("[{}] {:?}", record.index, record.payload),
///         None => thread::sleep(Duration::from_millis(10)),
///     }
/// }
/// ```
pub struct Tailer {
    medium: Arc<dyn LogMedium>,
    /// `None` until the appender creates the index.
    index: Option<IndexTable>,
    segments: SegmentReader,
    /// Index of the next record to deliver.
    next: u64,
    last_delivered: Option<u64>,
    position: Position,
    state: TailerState,
    fault: Option<Fault>,
}

impl Tailer {
    /// Opens a tailer on the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns `LogNotFound` if there is no log at `path`, and
    /// `IndexOutOfRange` if `start` names an index with no record.
    pub fn open(path: impl AsRef<Path>, start: StartPosition) -> CoreResult<Self> {
        let dir = LogDir::open(path.as_ref(), false)?;
        Self::with_medium(Arc::new(dir), start)
    }

    /// Opens a tailer on a log held in memory.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `start` names an index with no record.
    pub fn open_in_memory(medium: MemoryMedium, start: StartPosition) -> CoreResult<Self> {
        Self::with_medium(Arc::new(medium), start)
    }

    /// Opens a tailer on any medium.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `start` names an index with no record.
    pub fn with_medium(medium: Arc<dyn LogMedium>, start: StartPosition) -> CoreResult<Self> {
        let mut tailer = Self {
            segments: SegmentReader::new(Arc::clone(&medium)),
            medium,
            index: None,
            next: 0,
            last_delivered: None,
            position: Position::START,
            state: TailerState::AwaitingEntry,
            fault: None,
        };
        tailer.seek(start)?;
        debug!(start = %start, next = tailer.next, "opened tailer");
        Ok(tailer)
    }

    /// Moves the cursor.
    ///
    /// `Index(i)` requires record `i` to exist. `End` skips everything
    /// published so far. A failed tailer stays failed.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `start` names an index with no record.
    pub fn seek(&mut self, start: StartPosition) -> CoreResult<()> {
        let count = self.refresh_index()?;

        let (next, position) = match start {
            StartPosition::Beginning => (0, Position::START),
            StartPosition::Index(index) => {
                let entry = self.lookup(index, count)?;
                let position = Position {
                    segment_id: entry.segment_id,
                    offset: entry.offset,
                };
                (index, position)
            }
            StartPosition::End => match count.checked_sub(1) {
                Some(last) => {
                    let entry = self.lookup(last, count)?;
                    let position = Position {
                        segment_id: entry.segment_id,
                        offset: entry.end(),
                    };
                    (count, position)
                }
                None => (0, Position::START),
            },
        };

        self.next = next;
        self.position = position;
        self.last_delivered = None;
        if self.fault.is_none() {
            self.state = TailerState::AwaitingEntry;
        }
        Ok(())
    }

    /// Returns the next record, or `Ok(None)` if there is none yet.
    ///
    /// # Errors
    ///
    /// Returns `CorruptFrame` if the index points at bytes that do not form
    /// the promised frame. The tailer is then failed and returns the same
    /// error from every later poll. Other I/O errors leave the tailer usable.
    pub fn poll(&mut self) -> CoreResult<Option<Record>> {
        if let Some(fault) = &self.fault {
            return Err(fault.to_error());
        }

        let Some(entry) = self.next_entry()? else {
            self.state = TailerState::AwaitingEntry;
            return Ok(None);
        };

        match self.segments.read_entry(&entry) {
            Ok(payload) => {
                let index = self.next;
                self.next += 1;
                self.last_delivered = Some(index);
                self.position = Position {
                    segment_id: entry.segment_id,
                    offset: entry.end(),
                };
                self.state = TailerState::Delivered;
                trace!(index, segment = %entry.segment_id, offset = entry.offset, "polled record");
                Ok(Some(Record::new(index, payload)))
            }
            Err(CoreError::CorruptFrame {
                segment_id,
                offset,
                reason,
            }) => {
                warn!(index = self.next, segment = %segment_id, offset, reason = %reason, "tailer hit corrupt frame");
                let fault = Fault {
                    segment_id,
                    offset,
                    reason,
                };
                let error = fault.to_error();
                self.fault = Some(fault);
                self.state = TailerState::Failed;
                Err(error)
            }
            Err(e) => Err(e),
        }
    }

    /// Delivers available records to `f` until the tailer catches up, `max`
    /// records have been delivered, or `f` breaks. Returns the number
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Tailer::poll`]. Records delivered
    /// before the error stay delivered.
    pub fn drain<F>(&mut self, max: usize, mut f: F) -> CoreResult<usize>
    where
        F: FnMut(&Record) -> ControlFlow<()>,
    {
        let mut delivered = 0;
        while delivered < max {
            let Some(record) = self.poll()? else {
                break;
            };
            delivered += 1;
            if f(&record).is_break() {
                break;
            }
        }
        Ok(delivered)
    }

    /// Returns the index the next successful poll will deliver.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.next
    }

    /// Returns the index of the last delivered record.
    #[must_use]
    pub fn last_index(&self) -> Option<u64> {
        self.last_delivered
    }

    /// Returns the cursor's byte position.
    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    /// Returns what the last poll observed.
    #[must_use]
    pub fn state(&self) -> TailerState {
        self.state
    }

    /// Looks up the entry for `self.next`, refreshing the index only when the
    /// cached length says there is nothing new.
    fn next_entry(&mut self) -> CoreResult<Option<IndexEntry>> {
        let known = self.index.as_ref().map_or(0, IndexTable::len);
        let count = if self.next < known {
            known
        } else {
            self.refresh_index()?
        };

        if self.next >= count {
            return Ok(None);
        }
        self.lookup(self.next, count).map(Some)
    }

    fn refresh_index(&mut self) -> CoreResult<u64> {
        if self.index.is_none() {
            match self.medium.open_index(AccessMode::ReadOnly)? {
                Some(backend) => self.index = Some(IndexTable::open(backend)?),
                None => return Ok(0),
            }
        }
        match self.index.as_mut() {
            Some(index) => index.refresh(),
            None => Ok(0),
        }
    }

    fn lookup(&self, index: u64, count: u64) -> CoreResult<IndexEntry> {
        match &self.index {
            Some(table) => table.lookup(index),
            None => Err(CoreError::IndexOutOfRange { index, count }),
        }
    }
}

impl std::fmt::Debug for Tailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tailer")
            .field("next", &self.next)
            .field("position", &self.position)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
