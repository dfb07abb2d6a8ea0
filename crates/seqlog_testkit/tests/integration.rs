//! End-to-end tests across appender, tailer, recovery and the file layout.

use proptest::prelude::*;
use seqlog_core::codec;
use seqlog_core::index::{IndexEntry, INDEX_ENTRY_SIZE};
use seqlog_core::{
    Appender, CoreError, DurabilityPolicy, LogConfig, MemoryMedium, SegmentId, StartPosition, Tailer,
};
use seqlog_testkit::crash::chop_file;
use seqlog_testkit::prelude::*;
use std::thread;
use std::time::Duration;

fn memory_appender(config: LogConfig) -> (Appender, MemoryMedium) {
    let medium = MemoryMedium::new();
    let appender = Appender::open_in_memory(medium.clone(), config).unwrap();
    (appender, medium)
}

/// Reads record `i` straight from the stored bytes.
fn stored_payload(medium: &MemoryMedium, i: u64) -> Vec<u8> {
    let index = medium.index_data().unwrap();
    let at = i as usize * INDEX_ENTRY_SIZE;
    let raw: [u8; INDEX_ENTRY_SIZE] = index[at..at + INDEX_ENTRY_SIZE].try_into().unwrap();
    let entry = IndexEntry::decode(&raw);

    let segment = medium.segment_data(entry.segment_id).unwrap();
    let (payload, _) = codec::decode_complete(&segment[entry.offset as usize..], u32::MAX).unwrap();
    assert_eq!(payload.len(), entry.length as usize);
    payload.to_vec()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn indices_are_dense_and_payloads_round_trip(
        payloads in payloads_strategy(48, 40),
        policy in durability_strategy(),
    ) {
        let config = small_segments().durability(policy);
        let (appender, medium) = memory_appender(config);

        for (i, payload) in payloads.iter().enumerate() {
            prop_assert_eq!(appender.append(payload).unwrap(), i as u64);
        }
        prop_assert_eq!(appender.next_index(), payloads.len() as u64);

        for (i, payload) in payloads.iter().enumerate() {
            prop_assert_eq!(&stored_payload(&medium, i as u64), payload);
        }
    }

    #[test]
    fn rollover_is_invisible_to_tailers(
        payloads in payloads_strategy(60, 60),
        capacity in capacity_strategy(60),
    ) {
        let config = LogConfig::default()
            .segment_capacity_bytes(capacity)
            .max_payload_bytes(60)
            .durability(DurabilityPolicy::NoExplicitSync);
        let (appender, medium) = memory_appender(config);
        for payload in &payloads {
            appender.append(payload).unwrap();
        }

        let mut tailer = Tailer::open_in_memory(medium, StartPosition::Beginning).unwrap();
        prop_assert_eq!(drain_payloads(&mut tailer), payloads);
    }

    #[test]
    fn any_start_position_reads_the_suffix(
        payloads in payloads_strategy(16, 20).prop_filter("non-empty", |p| !p.is_empty()),
        pick in any::<prop::sample::Index>(),
    ) {
        let (appender, medium) = memory_appender(small_segments());
        for payload in &payloads {
            appender.append(payload).unwrap();
        }

        let start = pick.index(payloads.len());
        let mut tailer = Tailer::open_in_memory(medium, StartPosition::Index(start as u64)).unwrap();
        prop_assert_eq!(drain_payloads(&mut tailer), payloads[start..].to_vec());
    }
}

#[test]
fn example_scenario() {
    let log = TempLog::new();
    let appender = log.appender().unwrap();

    assert_eq!(appender.append(b"a").unwrap(), 0);
    assert_eq!(appender.append(b"bb").unwrap(), 1);

    let mut from_start = log.tailer(StartPosition::Beginning).unwrap();
    let mut from_end = log.tailer(StartPosition::End).unwrap();

    let first = from_start.poll().unwrap().unwrap();
    assert_eq!((first.index, first.payload.as_slice()), (0, b"a".as_slice()));
    let second = from_start.poll().unwrap().unwrap();
    assert_eq!((second.index, second.payload.as_slice()), (1, b"bb".as_slice()));
    assert!(from_start.poll().unwrap().is_none());
    assert!(from_end.poll().unwrap().is_none());

    assert_eq!(appender.append(b"ccc").unwrap(), 2);
    assert_eq!(from_start.poll().unwrap().unwrap().payload, b"ccc");
    assert_eq!(from_end.poll().unwrap().unwrap().payload, b"ccc");

    assert!(matches!(
        log.tailer(StartPosition::Index(3)),
        Err(CoreError::IndexOutOfRange { .. })
    ));
}

#[test]
fn second_appender_is_refused_until_first_closes() {
    let log = TempLog::new();
    let first = log.appender().unwrap();
    first.append(b"x").unwrap();

    assert!(matches!(log.appender(), Err(CoreError::AlreadyOwned)));

    first.close().unwrap();
    let second = log.appender().unwrap();
    assert_eq!(second.append(b"y").unwrap(), 1);
}

#[test]
fn torn_last_record_on_disk_is_dropped() {
    let log = TempLog::new();
    {
        let appender = log.appender_with(small_segments()).unwrap();
        append_numbered(&appender, 10);
        appender.close().unwrap();
    }

    let dir = seqlog_core::LogDir::open(log.path(), false).unwrap();
    let last = {
        use seqlog_core::LogMedium;
        *dir.segment_ids().unwrap().last().unwrap()
    };
    chop_file(&dir.segment_path(last), 3).unwrap();

    let appender = log.appender_with(small_segments()).unwrap();
    assert_eq!(appender.highest_index(), Some(8));
    assert!(!appender.recovery().is_clean());

    let mut tailer = log.tailer(StartPosition::Beginning).unwrap();
    let read = drain_payloads(&mut tailer);
    assert_eq!(read.len(), 9);
    assert_eq!(read[8], b"record-000008");

    assert_eq!(appender.append(b"replacement").unwrap(), 9);
    assert_eq!(tailer.poll().unwrap().unwrap().payload, b"replacement");
}

#[test]
fn lost_index_is_rebuilt_from_segments() {
    let log = TempLog::new();
    let written = {
        let appender = log.appender_with(small_segments()).unwrap();
        let written = append_numbered(&appender, 12);
        appender.close().unwrap();
        written
    };

    let dir = seqlog_core::LogDir::open(log.path(), false).unwrap();
    std::fs::write(dir.index_path(), b"").unwrap();

    let appender = log.appender_with(small_segments()).unwrap();
    assert_eq!(appender.recovery().rebuilt_entries, 12);
    assert_eq!(appender.next_index(), 12);

    let mut tailer = log.tailer(StartPosition::Index(5)).unwrap();
    assert_eq!(drain_payloads(&mut tailer), written[5..].to_vec());
}

#[test]
fn tailer_in_another_thread_follows_appends() {
    let log = TempLog::new();
    let appender = log.appender_with(small_segments()).unwrap();
    let mut tailer = log.tailer(StartPosition::Beginning).unwrap();

    let reader = thread::spawn(move || {
        let mut seen = Vec::new();
        while seen.len() < 50 {
            match tailer.poll().unwrap() {
                Some(record) => {
                    assert_eq!(record.index, seen.len() as u64);
                    seen.push(record.payload);
                }
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        seen
    });

    let written = append_numbered(&appender, 50);
    assert_eq!(reader.join().unwrap(), written);
}

#[test]
fn empty_payloads_are_records() {
    let (appender, medium) = memory_appender(LogConfig::default());
    assert_eq!(appender.append(b"").unwrap(), 0);
    assert_eq!(appender.append(b"").unwrap(), 1);

    let mut tailer = Tailer::open_in_memory(medium.clone(), StartPosition::Beginning).unwrap();
    assert_eq!(drain_payloads(&mut tailer), vec![Vec::<u8>::new(), Vec::new()]);
    assert_eq!(medium.segment_data(SegmentId::new(0)).unwrap().len(), 8);
}

#[test]
fn oversized_payload_leaves_log_untouched() {
    let config = LogConfig::default().segment_capacity_bytes(64).max_payload_bytes(8);
    let (appender, medium) = memory_appender(config);
    appender.append(b"ok").unwrap();

    assert!(matches!(
        appender.append(&[0; 9]),
        Err(CoreError::PayloadTooLarge { .. })
    ));
    assert_eq!(appender.next_index(), 1);
    assert_eq!(medium.segment_data(SegmentId::new(0)).unwrap().len(), 6);
    assert_eq!(medium.index_data().unwrap().len(), INDEX_ENTRY_SIZE);
}
