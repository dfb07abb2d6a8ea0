//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use seqlog_core::{DurabilityPolicy, StartPosition};
use proptest::prelude::*;
use std::time::Duration;

/// Strategy for payloads up to `max` bytes, empty payloads included.
pub fn payload_strategy(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max)
}

/// Strategy for a batch of payloads.
pub fn payloads_strategy(max_payload: usize, count: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(max_payload), 0..=count)
}

/// Strategy for text lines as the CLI would append them.
pub fn line_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{1,80}").expect("Invalid regex")
}

/// Strategy for every durability policy.
pub fn durability_strategy() -> impl Strategy<Value = DurabilityPolicy> {
    prop_oneof![
        Just(DurabilityPolicy::SyncEveryWrite),
        Just(DurabilityPolicy::NoExplicitSync),
        (1u32..16, 0u64..50).prop_map(|(records, millis)| DurabilityPolicy::SyncInterval {
            records,
            interval: Duration::from_millis(millis),
        }),
    ]
}

/// Strategy for a start position valid on a log of `count` records.
pub fn start_strategy(count: u64) -> BoxedStrategy<StartPosition> {
    if count == 0 {
        prop_oneof![Just(StartPosition::Beginning), Just(StartPosition::End)].boxed()
    } else {
        prop_oneof![
            Just(StartPosition::Beginning),
            Just(StartPosition::End),
            (0..count).prop_map(StartPosition::Index),
        ]
        .boxed()
    }
}

/// Strategy for segment capacities that fit a payload of `max_payload`.
pub fn capacity_strategy(max_payload: u32) -> impl Strategy<Value = u64> {
    let min = u64::from(max_payload) + 4;
    min..min * 8
}
