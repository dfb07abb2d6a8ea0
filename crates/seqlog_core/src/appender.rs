//! The single writer of a log.

use crate::codec::{self, FRAME_HEADER_SIZE};
use crate::config::{DurabilityPolicy, LogConfig};
use crate::dir::LogDir;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexEntry, IndexTable};
use crate::medium::{LogMedium, MemoryMedium, WriterLease};
use crate::recovery::{self, RecoveryReport};
use crate::segment::{SegmentInfo, SegmentStore};
use crate::stats::LogStats;
use crate::tailer::Tailer;
use crate::types::StartPosition;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Tracks when the next explicit sync is due.
#[derive(Debug)]
struct SyncSchedule {
    /// Appends since the last sync.
    pending: u32,
    last_sync: Instant,
}

impl SyncSchedule {
    fn new() -> Self {
        Self {
            pending: 0,
            last_sync: Instant::now(),
        }
    }

    /// Whether the append about to happen must be synced.
    fn due(&self, policy: DurabilityPolicy) -> bool {
        match policy {
            DurabilityPolicy::SyncEveryWrite => true,
            DurabilityPolicy::NoExplicitSync => false,
            DurabilityPolicy::SyncInterval { records, interval } => {
                (records > 0 && self.pending + 1 >= records)
                    || (!interval.is_zero() && self.last_sync.elapsed() >= interval)
            }
        }
    }

    fn appended(&mut self) {
        self.pending = self.pending.saturating_add(1);
    }

    fn synced(&mut self) {
        self.pending = 0;
        self.last_sync = Instant::now();
    }
}

struct AppenderInner {
    store: SegmentStore,
    index: IndexTable,
    schedule: SyncSchedule,
    closed: bool,
    /// Set when an entry became visible but could not be flushed or synced.
    /// Its index is taken, so no later append may run until reopen.
    stopped: bool,
}

/// The single-writer handle of a log.
///
/// At most one `Appender` exists per log at a time, across processes; opening
/// a second one fails with [`CoreError::AlreadyOwned`]. Within a process the
/// handle can be shared between threads; appends are serialized internally.
///
/// # Example
///
/// ```rust,ignore
/// use seqlog_core::Appender;
///
/// let appender = Appender::open("queue")?;
/// let index = appender.append(b"hello")?;
/// assert_eq!(appender.highest_index(), Some(index));
/// ```
pub struct Appender {
    inner: Mutex<AppenderInner>,
    /// Number of published records. The in-process publish point.
    published: AtomicU64,
    stats: Arc<LogStats>,
    medium: Arc<dyn LogMedium>,
    config: LogConfig,
    recovery: RecoveryReport,
    _lease: WriterLease,
}

impl Appender {
    /// Opens the log at `path` with the default configuration, creating it if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyOwned` if another appender holds the log, or any error
    /// from recovery.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open_with_config(path, LogConfig::default())
    }

    /// Opens the log at `path` with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig`, `LogNotFound`, `AlreadyOwned`, or any error
    /// from recovery.
    pub fn open_with_config(path: impl AsRef<Path>, config: LogConfig) -> CoreResult<Self> {
        config.validate()?;
        let dir = LogDir::open(path.as_ref(), config.create_if_missing)?;
        Self::with_medium(Arc::new(dir), config)
    }

    /// Opens a log held in memory.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyOwned` if another appender holds the medium.
    pub fn open_in_memory(medium: MemoryMedium, config: LogConfig) -> CoreResult<Self> {
        Self::with_medium(Arc::new(medium), config)
    }

    /// Opens a log on any medium.
    ///
    /// Takes the writer lease, runs recovery, and positions the tail.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig`, `AlreadyOwned`, or any error from recovery.
    pub fn with_medium(medium: Arc<dyn LogMedium>, config: LogConfig) -> CoreResult<Self> {
        config.validate()?;
        let lease = medium.acquire()?;

        let (index, recovery) = recovery::recover(medium.as_ref(), config.max_payload_bytes)?;
        let stats = Arc::new(LogStats::new());
        let store = SegmentStore::open(
            Arc::clone(&medium),
            config.segment_capacity_bytes,
            config.durability != DurabilityPolicy::NoExplicitSync,
            Arc::clone(&stats),
        )?;

        if recovery.is_clean() {
            info!(
                records = recovery.records,
                segment = %store.tail_id(),
                durability = %config.durability,
                "opened appender"
            );
        } else {
            warn!(
                records = recovery.records,
                dropped = recovery.dropped_entries,
                rebuilt = recovery.rebuilt_entries,
                truncated_bytes = recovery.truncated_bytes,
                "opened appender after repairing an unclean shutdown"
            );
        }

        Ok(Self {
            published: AtomicU64::new(index.len()),
            inner: Mutex::new(AppenderInner {
                store,
                index,
                schedule: SyncSchedule::new(),
                closed: false,
                stopped: false,
            }),
            stats,
            medium,
            config,
            recovery,
            _lease: lease,
        })
    }

    /// Appends a record and returns its index.
    ///
    /// The record is visible to tailers once this returns. Whether it is on
    /// stable storage depends on the [`DurabilityPolicy`].
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` before anything is written
    /// - `WriteFailed` if the medium failed; the index is not advanced. If
    ///   the failure came after the index entry was written, the appender
    ///   refuses further appends until the log is reopened
    pub fn append(&self, payload: &[u8]) -> CoreResult<u64> {
        let framed = codec::encode(payload, self.config.max_payload_bytes)?;
        let length = (framed.len() - FRAME_HEADER_SIZE) as u32;

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::invalid_operation("appender is closed"));
        }
        if inner.stopped {
            return Err(CoreError::write_failed(std::io::Error::new(
                std::io::ErrorKind::Other,
                "appender stopped after a failed index write, reopen to recover",
            )));
        }

        match self.append_locked(&mut inner, &framed, length) {
            Ok(index) => {
                self.published.store(index + 1, Ordering::Release);
                self.stats.record_append(u64::from(length));
                Ok(index)
            }
            Err(e) => {
                if matches!(e, CoreError::WriteFailed { .. }) {
                    self.stats.record_failure();
                    warn!(error = %e, "append failed");
                }
                Err(e)
            }
        }
    }

    fn append_locked(&self, inner: &mut AppenderInner, framed: &[u8], length: u32) -> CoreResult<u64> {
        let index = inner.index.len();
        let reservation = inner.store.allocate(framed.len() as u64)?;
        let sync = inner.schedule.due(self.config.durability);

        inner.store.write(&reservation, framed, sync)?;

        let entry = IndexEntry {
            segment_id: reservation.segment_id,
            offset: reservation.offset,
            length,
        };
        if let Err(e) = inner.index.append(index, entry) {
            inner.store.abandon(&reservation);
            return Err(e);
        }

        // Tailers can see the entry from here on, so a failure must not hand
        // `index` out again. Recovery on reopen settles the record.
        inner.schedule.appended();
        let committed = inner
            .index
            .flush()
            .and_then(|()| if sync { inner.index.sync() } else { Ok(()) });
        if let Err(e) = committed {
            inner.stopped = true;
            warn!(index, error = %e, "index write failed after the entry became visible, stopping appender");
            return Err(match e {
                CoreError::Storage(source) => CoreError::WriteFailed { source },
                other => other,
            });
        }
        if sync {
            inner.schedule.synced();
            self.stats.record_sync();
        }

        trace!(
            index,
            segment = %reservation.segment_id,
            offset = reservation.offset,
            length,
            synced = sync,
            "appended record"
        );
        Ok(index)
    }

    /// Returns the most recently published index, or `None` if the log is
    /// empty.
    #[must_use]
    pub fn highest_index(&self) -> Option<u64> {
        self.published.load(Ordering::Acquire).checked_sub(1)
    }

    /// Returns the index the next successful append will return.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Forces everything appended so far to stable storage, regardless of
    /// the durability policy.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        Self::sync_locked(&mut inner)?;
        self.stats.record_sync();
        Ok(())
    }

    fn sync_locked(inner: &mut AppenderInner) -> CoreResult<()> {
        inner.store.sync()?;
        inner.index.sync().map_err(|e| match e {
            CoreError::Storage(source) => CoreError::WriteFailed { source },
            other => other,
        })?;
        inner.schedule.synced();
        debug!(segment = %inner.store.tail_id(), offset = inner.store.durable_offset(), "synced log");
        Ok(())
    }

    /// Syncs and releases the log.
    ///
    /// Dropping an appender also syncs, but swallows errors.
    ///
    /// # Errors
    ///
    /// Returns `WriteFailed` if the final sync fails. The lock is released
    /// either way.
    pub fn close(self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        Self::sync_locked(&mut inner)
    }

    /// Opens a tailer on the same log.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `start` names an index with no record.
    pub fn tailer(&self, start: StartPosition) -> CoreResult<Tailer> {
        Tailer::with_medium(Arc::clone(&self.medium), start)
    }

    /// Returns the appender's statistics.
    #[must_use]
    pub fn stats(&self) -> &LogStats {
        &self.stats
    }

    /// Returns what recovery repaired when this appender opened.
    #[must_use]
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Returns every segment with its size.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.inner.lock().store.segments()
    }
}

impl Drop for Appender {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.closed {
            return;
        }
        inner.closed = true;
        if let Err(e) = Self::sync_locked(inner) {
            warn!(error = %e, "sync on drop failed");
        }
    }
}

impl std::fmt::Debug for Appender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Appender")
            .field("next_index", &self.next_index())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
