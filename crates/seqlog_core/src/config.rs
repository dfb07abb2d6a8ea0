//! Log configuration.

use crate::codec::FRAME_HEADER_SIZE;
use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// When the appender forces written bytes to stable storage.
///
/// Every policy hands each record to the operating system before it is
/// published, so other processes can read it immediately. The policies differ
/// in how many acknowledged records a power loss can take with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityPolicy {
    /// fsync after each record.
    SyncEveryWrite,
    /// fsync once `records` appends have accumulated or `interval` has elapsed
    /// since the last sync, whichever comes first. A zero value disables that
    /// trigger. Checked on each append.
    SyncInterval {
        /// Number of appends between syncs.
        records: u32,
        /// Maximum time between syncs.
        interval: Duration,
    },
    /// Never fsync explicitly; rely on the OS page cache. For benchmarking.
    NoExplicitSync,
}

impl DurabilityPolicy {
    /// Default record count for [`DurabilityPolicy::SyncInterval`].
    pub const DEFAULT_SYNC_RECORDS: u32 = 64;
    /// Default interval for [`DurabilityPolicy::SyncInterval`].
    pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(100);

    /// Interval policy with the default thresholds.
    #[must_use]
    pub const fn interval() -> Self {
        Self::SyncInterval {
            records: Self::DEFAULT_SYNC_RECORDS,
            interval: Self::DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl Default for DurabilityPolicy {
    fn default() -> Self {
        Self::interval()
    }
}

impl fmt::Display for DurabilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyncEveryWrite => write!(f, "every-write"),
            Self::SyncInterval { .. } => write!(f, "interval"),
            Self::NoExplicitSync => write!(f, "none"),
        }
    }
}

impl FromStr for DurabilityPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "every-write" | "sync-every-write" | "always" => Ok(Self::SyncEveryWrite),
            "interval" | "sync-interval" => Ok(Self::interval()),
            "none" | "no-explicit-sync" => Ok(Self::NoExplicitSync),
            other => Err(CoreError::invalid_config(format!(
                "unknown durability policy '{other}', expected every-write, interval or none"
            ))),
        }
    }
}

/// Configuration for opening a log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to create the log directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Maximum size of a single segment file before it is sealed.
    pub segment_capacity_bytes: u64,

    /// Largest payload a single record may carry.
    pub max_payload_bytes: u32,

    /// When written records are forced to stable storage.
    pub durability: DurabilityPolicy,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            segment_capacity_bytes: 64 * 1024 * 1024, // 64 MB
            max_payload_bytes: 1024 * 1024,           // 1 MB
            durability: DurabilityPolicy::default(),
        }
    }
}

impl LogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the log if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the segment capacity.
    #[must_use]
    pub const fn segment_capacity_bytes(mut self, size: u64) -> Self {
        self.segment_capacity_bytes = size;
        self
    }

    /// Sets the maximum payload size.
    #[must_use]
    pub const fn max_payload_bytes(mut self, size: u32) -> Self {
        self.max_payload_bytes = size;
        self
    }

    /// Sets the durability policy.
    #[must_use]
    pub const fn durability(mut self, policy: DurabilityPolicy) -> Self {
        self.durability = policy;
        self
    }

    /// Checks that the configuration can be honored.
    ///
    /// A record must always fit in an empty segment, so the largest frame
    /// (`max_payload_bytes` plus the length header) may not exceed the
    /// segment capacity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first violated constraint.
    pub fn validate(&self) -> CoreResult<()> {
        if self.segment_capacity_bytes == 0 {
            return Err(CoreError::invalid_config("segment capacity must be non-zero"));
        }

        let largest_frame = u64::from(self.max_payload_bytes) + FRAME_HEADER_SIZE as u64;
        if largest_frame > self.segment_capacity_bytes {
            return Err(CoreError::invalid_config(format!(
                "max payload of {} bytes does not fit a {}-byte segment",
                self.max_payload_bytes, self.segment_capacity_bytes
            )));
        }

        if let DurabilityPolicy::SyncInterval { records, interval } = self.durability {
            if records == 0 && interval.is_zero() {
                return Err(CoreError::invalid_config(
                    "sync interval needs a record count or a duration",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LogConfig::default();
        assert!(config.create_if_missing);
        assert_eq!(config.durability, DurabilityPolicy::interval());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = LogConfig::new()
            .create_if_missing(false)
            .segment_capacity_bytes(4096)
            .max_payload_bytes(128)
            .durability(DurabilityPolicy::SyncEveryWrite);

        assert!(!config.create_if_missing);
        assert_eq!(config.segment_capacity_bytes, 4096);
        assert_eq!(config.max_payload_bytes, 128);
        assert_eq!(config.durability, DurabilityPolicy::SyncEveryWrite);
    }

    #[test]
    fn payload_must_fit_segment() {
        let config = LogConfig::new()
            .segment_capacity_bytes(100)
            .max_payload_bytes(97);
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig { .. })));

        let config = config.max_payload_bytes(96);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_interval_rejected() {
        let config = LogConfig::new().durability(DurabilityPolicy::SyncInterval {
            records: 0,
            interval: Duration::ZERO,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn durability_parse() {
        assert_eq!(
            "every-write".parse::<DurabilityPolicy>().unwrap(),
            DurabilityPolicy::SyncEveryWrite
        );
        assert_eq!(
            "interval".parse::<DurabilityPolicy>().unwrap(),
            DurabilityPolicy::interval()
        );
        assert_eq!(
            "None".parse::<DurabilityPolicy>().unwrap(),
            DurabilityPolicy::NoExplicitSync
        );
        assert!("sometimes".parse::<DurabilityPolicy>().is_err());
    }

    #[test]
    fn durability_display_parses_back() {
        let custom = DurabilityPolicy::SyncInterval {
            records: 8,
            interval: Duration::from_millis(5),
        };
        for policy in [
            DurabilityPolicy::SyncEveryWrite,
            DurabilityPolicy::interval(),
            custom,
            DurabilityPolicy::NoExplicitSync,
        ] {
            let shown = policy.to_string();
            let parsed: DurabilityPolicy = shown.parse().unwrap();
            assert_eq!(parsed.to_string(), shown);
            assert_eq!(
                std::mem::discriminant(&parsed),
                std::mem::discriminant(&policy)
            );
        }
        assert_eq!(custom.to_string(), "interval");
    }
}
