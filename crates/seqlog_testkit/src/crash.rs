//! Crash and failure injection for seqlog.
//!
//! Two tools live here:
//!
//! - [`FaultyMedium`] wraps another medium and hands the appender storage
//!   handles that fail on command. It drives the `WriteFailed` paths: torn
//!   appends, failed flushes and syncs, and failed cut-backs.
//! - [`CrashRecoveryHarness`] damages a closed on-disk log the way a power
//!   cut would and checks what a reopened appender recovers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seqlog_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::with_temp_dir()?;
//! let results = harness.run_all();
//! assert!(results.iter().all(|r| r.passed));
//! ```

use seqlog_core::{
    AccessMode, Appender, CoreError, LogConfig, LogDir, LogMedium, SegmentId, StartPosition,
    Tailer, WriterLease,
};
use seqlog_storage::{StorageBackend, StorageError, StorageResult};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// After the last record was fully written and indexed.
    AfterLastRecord,
    /// Partway through the payload of the last record.
    DuringPayload,
    /// Partway through the length header of the last record.
    DuringHeader,
    /// After the last frame was written but before its index entry was.
    BeforeIndexEntry,
    /// Partway through the last index entry.
    DuringIndexEntry,
}

impl CrashPoint {
    /// All crash points, in the order the harness runs them.
    pub const ALL: [Self; 5] = [
        Self::AfterLastRecord,
        Self::DuringPayload,
        Self::DuringHeader,
        Self::BeforeIndexEntry,
        Self::DuringIndexEntry,
    ];

    /// Records that must survive a crash at this point, out of `written`.
    #[must_use]
    pub const fn surviving(self, written: u64) -> u64 {
        match self {
            Self::AfterLastRecord | Self::BeforeIndexEntry | Self::DuringIndexEntry => written,
            Self::DuringPayload | Self::DuringHeader => written.saturating_sub(1),
        }
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Records expected after recovery.
    pub expected_records: u64,
    /// Records found after recovery.
    pub actual_records: u64,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, records: u64) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_records: records,
            actual_records: records,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: u64, actual: u64, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_records: expected,
            actual_records: actual,
            error: Some(error.to_string()),
        }
    }
}

fn injected(what: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("injected {what} failure")))
}

/// Switches shared by every handle a [`FaultyMedium`] hands out for one
/// kind of file.
///
/// `crash_after` counts bytes appended through all handles, so a threshold
/// can land inside any later record.
#[derive(Debug)]
pub struct FaultPlan {
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_flush: AtomicBool,
    fail_on_sync: AtomicBool,
    fail_on_truncate: AtomicBool,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_flush: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
            fail_on_truncate: AtomicBool::new(false),
        }
    }
}

impl FaultPlan {
    /// Fails appends once `bytes` more bytes have been written. The append
    /// that crosses the threshold writes its prefix before failing.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.bytes_written.load(Ordering::SeqCst);
        self.crash_after_bytes.store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Sets whether flush should fail.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Sets whether sync should fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Sets whether truncate should fail.
    pub fn set_fail_on_truncate(&self, fail: bool) {
        self.fail_on_truncate.store(fail, Ordering::SeqCst);
    }

    /// Clears every fault. The byte count keeps running.
    pub fn reset(&self) {
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_on_flush.store(false, Ordering::SeqCst);
        self.fail_on_sync.store(false, Ordering::SeqCst);
        self.fail_on_truncate.store(false, Ordering::SeqCst);
    }

    /// Returns whether an injected fault has fired.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Bytes appended through handles sharing this plan.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::SeqCst)
    }

    fn trip(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        injected(what)
    }
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    plan: Arc<FaultPlan>,
}

impl CrashableBackend {
    /// Wraps `inner` with a plan of its own.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self::with_plan(inner, Arc::new(FaultPlan::default()))
    }

    /// Wraps `inner` with a shared plan.
    pub fn with_plan(inner: Box<dyn StorageBackend>, plan: Arc<FaultPlan>) -> Self {
        Self { inner, plan }
    }

    /// The plan controlling this backend.
    pub fn plan(&self) -> &Arc<FaultPlan> {
        &self.plan
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let current = self.plan.bytes_written.fetch_add(data.len(), Ordering::SeqCst);
        let threshold = self.plan.crash_after_bytes.load(Ordering::SeqCst);

        if current >= threshold {
            return Err(self.plan.trip("write"));
        }

        if current + data.len() > threshold {
            let partial_len = threshold - current;
            if partial_len > 0 {
                let _ = self.inner.append(&data[..partial_len]);
            }
            return Err(self.plan.trip("partial write"));
        }

        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.plan.fail_on_flush.load(Ordering::SeqCst) {
            return Err(self.plan.trip("flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn refresh(&mut self) -> StorageResult<u64> {
        self.inner.refresh()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.plan.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.plan.trip("sync"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.plan.fail_on_truncate.load(Ordering::SeqCst) {
            return Err(self.plan.trip("truncate"));
        }
        self.inner.truncate(new_size)
    }
}

/// A medium whose writable handles fail on command.
///
/// Segments and the index have separate plans. Read-only handles pass
/// straight through, so tailers see exactly what reached the inner medium.
#[derive(Clone)]
pub struct FaultyMedium {
    inner: Arc<dyn LogMedium>,
    segments: Arc<FaultPlan>,
    index: Arc<FaultPlan>,
}

impl FaultyMedium {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: Arc<dyn LogMedium>) -> Self {
        Self {
            inner,
            segments: Arc::new(FaultPlan::default()),
            index: Arc::new(FaultPlan::default()),
        }
    }

    /// Faults for segment handles.
    pub fn segment_faults(&self) -> &FaultPlan {
        &self.segments
    }

    /// Faults for index handles.
    pub fn index_faults(&self) -> &FaultPlan {
        &self.index
    }

    /// The wrapped medium.
    pub fn inner(&self) -> Arc<dyn LogMedium> {
        Arc::clone(&self.inner)
    }
}

impl std::fmt::Debug for FaultyMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyMedium")
            .field("segments", &self.segments)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl LogMedium for FaultyMedium {
    fn segment_ids(&self) -> seqlog_core::CoreResult<Vec<SegmentId>> {
        self.inner.segment_ids()
    }

    fn open_segment(
        &self,
        id: SegmentId,
        mode: AccessMode,
    ) -> seqlog_core::CoreResult<Box<dyn StorageBackend>> {
        let backend = self.inner.open_segment(id, mode)?;
        Ok(match mode {
            AccessMode::ReadWrite => {
                Box::new(CrashableBackend::with_plan(backend, Arc::clone(&self.segments)))
            }
            AccessMode::ReadOnly => backend,
        })
    }

    fn open_index(&self, mode: AccessMode) -> seqlog_core::CoreResult<Option<Box<dyn StorageBackend>>> {
        let backend = self.inner.open_index(mode)?;
        Ok(match mode {
            AccessMode::ReadWrite => backend.map(|b| {
                Box::new(CrashableBackend::with_plan(b, Arc::clone(&self.index))) as Box<dyn StorageBackend>
            }),
            AccessMode::ReadOnly => backend,
        })
    }

    fn acquire(&self) -> seqlog_core::CoreResult<WriterLease> {
        self.inner.acquire()
    }
}

/// Cuts `bytes` off the end of a file, as a torn write would.
///
/// # Errors
///
/// Fails if the file cannot be opened or resized.
pub fn chop_file(path: &Path, bytes: u64) -> std::io::Result<u64> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len().saturating_sub(bytes);
    file.set_len(len)?;
    file.sync_all()?;
    Ok(len)
}

/// Appends raw bytes to a file, as an unindexed write would leave them.
///
/// # Errors
///
/// Fails if the file cannot be opened or written.
pub fn append_garbage(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Test harness for crash recovery scenarios on a real directory.
pub struct CrashRecoveryHarness {
    /// Path to the log directory under test.
    pub log_path: PathBuf,
    /// Configuration used for every appender.
    pub config: LogConfig,
    /// Records written before each simulated crash.
    pub records: u64,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
    _temp_dir: Option<TempDir>,
}

impl CrashRecoveryHarness {
    /// Creates a harness for the log at `log_path`.
    pub fn new(log_path: impl AsRef<Path>) -> Self {
        Self {
            log_path: log_path.as_ref().to_path_buf(),
            config: LogConfig::default().segment_capacity_bytes(256).max_payload_bytes(128),
            records: 20,
            results: Vec::new(),
            _temp_dir: None,
        }
    }

    /// Creates a harness in a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub fn with_temp_dir() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let mut harness = Self::new(temp_dir.path().join("log"));
        harness._temp_dir = Some(temp_dir);
        Ok(harness)
    }

    /// Payload of record `i`. Lengths vary so frames straddle segment
    /// boundaries at different offsets.
    pub fn payload(i: u64) -> Vec<u8> {
        format!("record-{i}-{}", "x".repeat((i % 7) as usize)).into_bytes()
    }

    fn fresh_log(&self) -> Result<Appender, CoreError> {
        let _ = std::fs::remove_dir_all(&self.log_path);
        Appender::open_with_config(&self.log_path, self.config.clone())
    }

    fn fill(&self) -> Result<(), CoreError> {
        let appender = self.fresh_log()?;
        for i in 0..self.records {
            appender.append(&Self::payload(i))?;
        }
        appender.close()
    }

    fn damage(&self, point: CrashPoint) -> Result<(), CoreError> {
        let dir = LogDir::open(&self.log_path, false)?;
        let last = dir.segment_ids()?.last().copied().unwrap_or_default();
        let tail = dir.segment_path(last);
        let last_payload = Self::payload(self.records - 1).len() as u64;

        match point {
            CrashPoint::AfterLastRecord => {}
            CrashPoint::DuringPayload => {
                chop_file(&tail, last_payload / 2 + 1)?;
                chop_file(&dir.index_path(), 16)?;
            }
            CrashPoint::DuringHeader => {
                chop_file(&tail, last_payload + 2)?;
                chop_file(&dir.index_path(), 16)?;
            }
            CrashPoint::BeforeIndexEntry => {
                chop_file(&dir.index_path(), 16)?;
            }
            CrashPoint::DuringIndexEntry => {
                chop_file(&dir.index_path(), 5)?;
            }
        }
        Ok(())
    }

    /// Reopens the log and returns the number of readable records, checking
    /// every payload along the way.
    fn recovered_records(&self) -> Result<u64, String> {
        let appender =
            Appender::open_with_config(&self.log_path, self.config.clone()).map_err(|e| e.to_string())?;
        let count = appender.next_index();

        let mut tailer = Tailer::open(&self.log_path, StartPosition::Beginning).map_err(|e| e.to_string())?;
        let mut seen = 0;
        while let Some(record) = tailer.poll().map_err(|e| e.to_string())? {
            if record.index != seen || record.payload != Self::payload(seen) {
                return Err(format!("record {} does not match what was written", record.index));
            }
            seen += 1;
        }
        if seen != count {
            return Err(format!("tailer read {seen} records, appender resumed at {count}"));
        }

        let next = appender.append(b"after-crash").map_err(|e| e.to_string())?;
        if next != count {
            return Err(format!("first append after recovery got {next}, expected {count}"));
        }
        Ok(count)
    }

    /// Writes the log, crashes it at `point`, and checks recovery.
    pub fn test_crash(&mut self, point: CrashPoint) -> CrashRecoveryResult {
        let description = format!("crash {point:?}");
        let expected = point.surviving(self.records);

        let result = match self.fill().and_then(|()| self.damage(point)) {
            Err(e) => CrashRecoveryResult::fail(&description, expected, 0, &e.to_string()),
            Ok(()) => match self.recovered_records() {
                Ok(actual) if actual == expected => CrashRecoveryResult::pass(&description, actual),
                Ok(actual) => CrashRecoveryResult::fail(&description, expected, actual, "record count mismatch"),
                Err(e) => CrashRecoveryResult::fail(&description, expected, 0, &e),
            },
        };

        self.results.push(result.clone());
        result
    }

    /// Tests that an unindexed tail of garbage is discarded.
    pub fn test_trailing_garbage(&mut self) -> CrashRecoveryResult {
        let description = "trailing garbage";
        let expected = self.records;

        let damaged = self.fill().and_then(|()| {
            let dir = LogDir::open(&self.log_path, false)?;
            let last = dir.segment_ids()?.last().copied().unwrap_or_default();
            // A header declaring far more than the segment holds.
            append_garbage(&dir.segment_path(last), &[0xff, 0xff, 0x00, 0x00, 1, 2, 3])?;
            Ok(())
        });

        let result = match damaged {
            Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e.to_string()),
            Ok(()) => match self.recovered_records() {
                Ok(actual) if actual == expected => CrashRecoveryResult::pass(description, actual),
                Ok(actual) => CrashRecoveryResult::fail(description, expected, actual, "record count mismatch"),
                Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e),
            },
        };

        self.results.push(result.clone());
        result
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> Vec<CrashRecoveryResult> {
        for point in CrashPoint::ALL {
            self.test_crash(point);
        }
        self.test_trailing_garbage();
        self.results.clone()
    }

    /// Prints a summary of all results.
    pub fn print_summary(&self) {
        let passed = self.results.iter().filter(|r| r.passed).count();
        println!("\n=== Crash Recovery: {passed}/{} passed ===", self.results.len());
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            println!(
                "[{status}] {} (expected {}, got {})",
                result.description, result.expected_records, result.actual_records
            );
            if let Some(error) = &result.error {
                println!("       {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqlog_core::{DurabilityPolicy, MemoryMedium, StatsSnapshot};

    fn faulty() -> (MemoryMedium, FaultyMedium) {
        let memory = MemoryMedium::new();
        let faulty = FaultyMedium::new(Arc::new(memory.clone()));
        (memory, faulty)
    }

    fn appender(medium: &FaultyMedium, policy: DurabilityPolicy) -> Appender {
        Appender::with_medium(Arc::new(medium.clone()), LogConfig::default().durability(policy)).unwrap()
    }

    #[test]
    fn every_crash_point_recovers() {
        let mut harness = CrashRecoveryHarness::with_temp_dir().unwrap();
        let results = harness.run_all();
        harness.print_summary();
        for result in results {
            assert!(result.passed, "{}: {:?}", result.description, result.error);
        }
    }

    #[test]
    fn torn_append_is_cut_back() {
        let (memory, faulty) = faulty();
        let appender = appender(&faulty, DurabilityPolicy::NoExplicitSync);
        appender.append(b"one").unwrap();

        faulty.segment_faults().crash_after(5);
        assert!(matches!(appender.append(b"two"), Err(CoreError::WriteFailed { .. })));
        assert!(faulty.segment_faults().has_crashed());
        assert_eq!(appender.highest_index(), Some(0));
        assert_eq!(memory.segment_data(SegmentId::new(0)).unwrap().len(), 7);

        faulty.segment_faults().reset();
        assert_eq!(appender.append(b"three").unwrap(), 1);

        let mut tailer = appender.tailer(StartPosition::Beginning).unwrap();
        assert_eq!(tailer.poll().unwrap().unwrap().payload, b"one");
        assert_eq!(tailer.poll().unwrap().unwrap().payload, b"three");
        assert!(tailer.poll().unwrap().is_none());
    }

    #[test]
    fn failed_cut_back_moves_to_new_segment() {
        let (memory, faulty) = faulty();
        let appender = appender(&faulty, DurabilityPolicy::NoExplicitSync);
        appender.append(b"one").unwrap();

        faulty.segment_faults().crash_after(5);
        faulty.segment_faults().set_fail_on_truncate(true);
        assert!(appender.append(b"two").is_err());

        faulty.segment_faults().reset();
        assert_eq!(appender.append(b"three").unwrap(), 1);
        assert_eq!(memory.segment_ids().unwrap().len(), 2);

        let mut tailer = appender.tailer(StartPosition::Index(1)).unwrap();
        assert_eq!(tailer.poll().unwrap().unwrap().payload, b"three");
    }

    #[test]
    fn index_sync_failure_never_reuses_visible_index() {
        let (memory, faulty) = faulty();
        let appender = appender(&faulty, DurabilityPolicy::SyncEveryWrite);
        let mut tailer = appender.tailer(StartPosition::Beginning).unwrap();
        appender.append(b"one").unwrap();

        faulty.index_faults().set_fail_on_sync(true);
        assert!(matches!(appender.append(b"two"), Err(CoreError::WriteFailed { .. })));
        assert_eq!(appender.highest_index(), Some(0));

        // The entry was visible before the sync failed.
        let seen: Vec<_> = std::iter::from_fn(|| tailer.poll().unwrap())
            .map(|r| (r.index, r.payload))
            .collect();
        assert_eq!(seen, vec![(0, b"one".to_vec()), (1, b"two".to_vec())]);

        faulty.index_faults().reset();
        assert!(matches!(appender.append(b"three"), Err(CoreError::WriteFailed { .. })));
        assert!(tailer.poll().unwrap().is_none());
        drop(appender);

        let reopened = Appender::open_in_memory(memory.clone(), LogConfig::default()).unwrap();
        assert_eq!(reopened.next_index(), 2);
        assert_eq!(reopened.append(b"three").unwrap(), 2);

        let mut fresh = reopened.tailer(StartPosition::Index(1)).unwrap();
        assert_eq!(fresh.poll().unwrap().unwrap().payload, b"two");
        assert_eq!(tailer.poll().unwrap().unwrap().payload, b"three");
    }

    #[test]
    fn index_flush_failure_stops_appender() {
        let (memory, faulty) = faulty();
        let appender = appender(&faulty, DurabilityPolicy::NoExplicitSync);

        faulty.index_faults().set_fail_on_flush(true);
        assert!(appender.append(b"first").is_err());
        assert_eq!(appender.highest_index(), None);

        let snapshot: StatsSnapshot = appender.stats().snapshot();
        assert_eq!(snapshot.failed_appends, 1);
        assert_eq!(snapshot.records_appended, 0);

        faulty.index_faults().reset();
        assert!(appender.append(b"second").is_err());
        assert_eq!(appender.stats().failed_appends(), 2);
        drop(appender);

        let reopened = Appender::open_in_memory(memory, LogConfig::default()).unwrap();
        assert_eq!(reopened.append(b"second").unwrap(), 1);
    }

    #[test]
    fn torn_index_entry_reuses_index() {
        let (memory, faulty) = faulty();
        let appender = appender(&faulty, DurabilityPolicy::NoExplicitSync);
        appender.append(b"one").unwrap();

        // Half an entry is never counted by readers, so the index is still free.
        faulty.index_faults().crash_after(8);
        assert!(matches!(appender.append(b"two"), Err(CoreError::WriteFailed { .. })));
        assert_eq!(memory.index_data().unwrap().len(), 16);
        assert_eq!(memory.segment_data(SegmentId::new(0)).unwrap().len(), 7);

        faulty.index_faults().reset();
        assert_eq!(appender.append(b"two").unwrap(), 1);
    }

    #[test]
    fn torn_write_left_on_crash_is_recovered() {
        let (memory, faulty) = faulty();
        let appender = appender(&faulty, DurabilityPolicy::NoExplicitSync);
        for i in 0..3u8 {
            appender.append(&[i; 10]).unwrap();
        }

        // Power cut: the prefix stays and nothing gets to cut it back.
        faulty.segment_faults().crash_after(6);
        faulty.segment_faults().set_fail_on_truncate(true);
        assert!(appender.append(&[9; 10]).is_err());
        drop(appender);

        let reopened = Appender::open_in_memory(memory.clone(), LogConfig::default()).unwrap();
        assert_eq!(reopened.next_index(), 3);
        assert_eq!(reopened.recovery().records, 3);
        assert_eq!(reopened.append(b"next").unwrap(), 3);
    }

    #[test]
    fn chop_file_reports_new_length() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, [0u8; 10]).unwrap();

        assert_eq!(chop_file(&path, 3).unwrap(), 7);
        assert_eq!(chop_file(&path, 100).unwrap(), 0);
    }
}
