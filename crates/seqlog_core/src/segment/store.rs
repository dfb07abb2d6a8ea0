//! Writer-side segment management.

use super::SegmentInfo;
use crate::error::{CoreError, CoreResult};
use crate::medium::{AccessMode, LogMedium};
use crate::stats::LogStats;
use crate::types::SegmentId;
use seqlog_storage::StorageBackend;
use std::sync::Arc;
use tracing::{debug, warn};

/// Space reserved for one frame in the tail segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Segment the frame goes into.
    pub segment_id: SegmentId,
    /// Offset of the frame header.
    pub offset: u64,
    /// Framed length (header plus payload).
    pub len: u64,
}

/// The writable tail segment.
struct Tail {
    id: SegmentId,
    backend: Box<dyn StorageBackend>,
    /// Bytes handed to the medium.
    written: u64,
    /// Bytes known to be on stable storage.
    durable: u64,
    /// A failed write left unknown bytes past `written`.
    poisoned: bool,
}

/// Manages the sealed segments and the tail segment of one log.
///
/// Only the appender holds a `SegmentStore`; all calls happen under the
/// appender's lock.
pub struct SegmentStore {
    medium: Arc<dyn LogMedium>,
    capacity: u64,
    sync_on_seal: bool,
    sealed: Vec<SegmentInfo>,
    tail: Tail,
    stats: Arc<LogStats>,
}

impl SegmentStore {
    /// Opens the store over a recovered medium.
    ///
    /// The last existing segment becomes the tail; a fresh log gets segment 0.
    /// Everything already in the tail is assumed durable, which holds right
    /// after recovery.
    ///
    /// # Errors
    ///
    /// Fails if segments cannot be listed or opened.
    pub fn open(
        medium: Arc<dyn LogMedium>,
        capacity: u64,
        sync_on_seal: bool,
        stats: Arc<LogStats>,
    ) -> CoreResult<Self> {
        let ids = medium.segment_ids()?;
        let (tail_id, sealed_ids) = match ids.split_last() {
            Some((last, rest)) => (*last, rest.to_vec()),
            None => (SegmentId::new(0), Vec::new()),
        };

        let mut sealed = Vec::with_capacity(sealed_ids.len());
        for id in sealed_ids {
            let size = medium.open_segment(id, AccessMode::ReadOnly)?.size()?;
            sealed.push(SegmentInfo { id, size });
        }

        let backend = medium.open_segment(tail_id, AccessMode::ReadWrite)?;
        let written = backend.size()?;
        debug!(segment = %tail_id, size = written, sealed = sealed.len(), "opened segment store");

        Ok(Self {
            medium,
            capacity,
            sync_on_seal,
            sealed,
            tail: Tail {
                id: tail_id,
                backend,
                written,
                durable: written,
                poisoned: false,
            },
            stats,
        })
    }

    /// Reserves space for a frame of `framed_len` bytes.
    ///
    /// Rolls over to a fresh segment when the frame does not fit in the tail,
    /// or when the tail was poisoned by a failed write. An empty tail always
    /// accepts the frame.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if rollover fails.
    pub fn allocate(&mut self, framed_len: u64) -> CoreResult<Reservation> {
        let fits = self.tail.written + framed_len <= self.capacity;
        if self.tail.poisoned || (!fits && self.tail.written > 0) {
            self.roll()?;
        }

        Ok(Reservation {
            segment_id: self.tail.id,
            offset: self.tail.written,
            len: framed_len,
        })
    }

    /// Writes a frame at its reservation, syncing if `sync` is set.
    ///
    /// On failure the reservation is abandoned and `WriteFailed` returned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for a stale reservation and `WriteFailed`
    /// on I/O failure.
    pub fn write(&mut self, reservation: &Reservation, framed: &[u8], sync: bool) -> CoreResult<()> {
        if reservation.segment_id != self.tail.id
            || reservation.offset != self.tail.written
            || reservation.len != framed.len() as u64
        {
            return Err(CoreError::invalid_operation(format!(
                "stale reservation at {}:{}",
                reservation.segment_id, reservation.offset
            )));
        }

        let result = self.tail.backend.append(framed).and_then(|offset| {
            if offset == reservation.offset {
                self.tail.backend.flush()
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("frame landed at {offset}, reserved {}", reservation.offset),
                )
                .into())
            }
        });
        if let Err(e) = result {
            self.abandon(reservation);
            return Err(CoreError::write_failed(e));
        }
        self.tail.written += reservation.len;

        if sync {
            if let Err(e) = self.tail.backend.sync() {
                self.abandon(reservation);
                return Err(CoreError::write_failed(e));
            }
            self.tail.durable = self.tail.written;
        }

        Ok(())
    }

    /// Gives up a reservation whose frame must never be indexed.
    ///
    /// Cuts the tail back to the reservation offset. If that fails the tail
    /// is poisoned so the next allocation moves to a fresh segment, leaving
    /// the bytes behind as an unreferenced gap.
    pub fn abandon(&mut self, reservation: &Reservation) {
        if reservation.segment_id != self.tail.id {
            return;
        }

        match self.tail.backend.truncate(reservation.offset) {
            Ok(()) => {
                self.tail.written = reservation.offset;
                self.tail.durable = self.tail.durable.min(reservation.offset);
                debug!(segment = %self.tail.id, offset = reservation.offset, "abandoned reservation");
            }
            Err(e) => {
                warn!(
                    segment = %self.tail.id,
                    offset = reservation.offset,
                    error = %e,
                    "could not cut back failed write, poisoning tail segment"
                );
                self.tail.poisoned = true;
            }
        }
    }

    /// Forces the tail segment to stable storage.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        if self.tail.durable == self.tail.written {
            return Ok(());
        }
        self.tail.backend.sync().map_err(CoreError::write_failed)?;
        self.tail.durable = self.tail.written;
        Ok(())
    }

    /// Seals the tail and starts the next segment.
    fn roll(&mut self) -> CoreResult<()> {
        if self.sync_on_seal && !self.tail.poisoned {
            self.sync()?;
        }

        let next = self.tail.id.next();
        let backend = self
            .medium
            .open_segment(next, AccessMode::ReadWrite)
            .map_err(|e| match e {
                CoreError::Storage(source) => CoreError::WriteFailed { source },
                CoreError::Io(source) => CoreError::write_failed(source),
                other => other,
            })?;
        let existing = backend.size()?;
        if existing != 0 {
            return Err(CoreError::invalid_format(format!(
                "new segment {next} already holds {existing} bytes"
            )));
        }

        let previous = std::mem::replace(
            &mut self.tail,
            Tail {
                id: next,
                backend,
                written: 0,
                durable: 0,
                poisoned: false,
            },
        );
        self.sealed.push(SegmentInfo {
            id: previous.id,
            size: previous.written,
        });
        self.stats.record_rollover();

        debug!(
            sealed = %previous.id,
            size = previous.written,
            poisoned = previous.poisoned,
            segment = %next,
            "rolled over to new segment"
        );
        Ok(())
    }

    /// Returns the tail segment ID.
    #[must_use]
    pub fn tail_id(&self) -> SegmentId {
        self.tail.id
    }

    /// Returns the offset the next frame will be written at.
    #[must_use]
    pub fn written_offset(&self) -> u64 {
        self.tail.written
    }

    /// Returns the tail's durable high-water mark.
    #[must_use]
    pub fn durable_offset(&self) -> u64 {
        self.tail.durable
    }

    /// Returns true if the tail holds bytes not yet synced.
    #[must_use]
    pub fn has_unsynced(&self) -> bool {
        self.tail.durable < self.tail.written
    }

    /// Returns every segment, sealed ones first, with its size.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentInfo> {
        let mut all = self.sealed.clone();
        all.push(SegmentInfo {
            id: self.tail.id,
            size: self.tail.written,
        });
        all
    }
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStore")
            .field("capacity", &self.capacity)
            .field("sealed", &self.sealed.len())
            .field("tail", &self.tail.id)
            .field("written", &self.tail.written)
            .field("durable", &self.tail.durable)
            .field("poisoned", &self.tail.poisoned)
            .finish_non_exhaustive()
    }
}
