//! Store configuration and the wall clock used for naming and rotation.
//!
//! A [`StoreConfig`] is fixed for the lifetime of a store. It decides where
//! segments live, how their names and record timestamps are rendered, what
//! the header block says, and the two rotation limits.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default total byte budget across all segments (10 MiB).
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 10 * 1024 * 1024;

/// Default maximum number of segments kept on disk.
pub const DEFAULT_MAX_SEGMENT_COUNT: u64 = 10;

/// Instant used to probe timestamp patterns during validation.
const PROBE_MILLIS: i64 = 1_642_587_751_123; // 2022-01-19 10:22:31.123 UTC

/// Configuration of a segment store.
///
/// All timestamp patterns use `chrono` strftime syntax.
///
/// # Example
///
/// ```rust
/// use rotalog::config::StoreConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = StoreConfig::new("/var/log/myapp")
///     .with_limits(4 * 1024 * 1024, 8)
///     .with_prefix("app");
/// config.validate()?;
/// assert_eq!(config.segment_capacity(), 512 * 1024);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory that holds the segment files.
    pub directory: PathBuf,

    /// Leading part of every segment name, before the `-`.
    pub file_prefix: String,

    /// Segment file extension, without the dot.
    pub file_extension: String,

    /// Pattern of the timestamp embedded in segment names.
    ///
    /// Rendered in the fixed reference zone. The default
    /// `%Y-%m-%d %H-%M-%S %3f` keeps millisecond precision.
    pub file_name_pattern: String,

    /// Pattern of the timestamp that opens every record line.
    ///
    /// Always rendered in UTC. Every rendering must have the same width,
    /// since extraction parses a fixed-width line prefix.
    pub record_timestamp_pattern: String,

    /// Pattern of the two creation dates on the `#Date:` header line.
    pub header_date_pattern: String,

    /// Offset of the fixed reference zone in seconds east of UTC.
    ///
    /// Segment names and the "same day" rotation rule use this zone.
    pub zone_offset_secs: i32,

    /// Encoding name written to the `#Encoding:` header line.
    pub encoding: String,

    /// Format version written to the `#Version:` header line.
    pub version: String,

    /// Field legend written to the `#Fields:` header line.
    pub fields: String,

    /// Marker placed in front of the JSON parameter object.
    pub params_prefix: String,

    /// Upper bound on the sum of all segment sizes. 0 disables writing.
    pub max_total_bytes: u64,

    /// Upper bound on the number of segments. 0 disables writing.
    pub max_segment_count: u64,

    /// Re-emit every saved record as a `tracing` event.
    pub mirror_to_tracing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_prefix: "main".to_string(),
            file_extension: "log".to_string(),
            file_name_pattern: "%Y-%m-%d %H-%M-%S %3f".to_string(),
            record_timestamp_pattern: "%Y-%m-%d %H:%M:%S%.3fZ".to_string(),
            header_date_pattern: "%Y-%m-%d %H:%M %:z".to_string(),
            zone_offset_secs: 0,
            encoding: "UTF-8".to_string(),
            version: "1.0.0".to_string(),
            fields: "timestamp level [thread, *tag] message *params".to_string(),
            params_prefix: "#PR".to_string(),
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            max_segment_count: DEFAULT_MAX_SEGMENT_COUNT,
            mirror_to_tracing: false,
        }
    }
}

impl StoreConfig {
    /// Creates a default configuration rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Sets the total byte budget and the segment count limit.
    #[must_use]
    pub fn with_limits(mut self, max_total_bytes: u64, max_segment_count: u64) -> Self {
        self.max_total_bytes = max_total_bytes;
        self.max_segment_count = max_segment_count;
        self
    }

    /// Sets the segment name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Sets the fixed reference zone, in seconds east of UTC.
    #[must_use]
    pub fn with_zone_offset(mut self, seconds: i32) -> Self {
        self.zone_offset_secs = seconds;
        self
    }

    /// Enables or disables mirroring of records into `tracing`.
    #[must_use]
    pub fn with_tracing_mirror(mut self, enabled: bool) -> Self {
        self.mirror_to_tracing = enabled;
        self
    }

    /// Byte capacity of a single segment: total budget divided by count.
    ///
    /// Returns 0 when the count limit is 0.
    pub fn segment_capacity(&self) -> u64 {
        self.max_total_bytes
            .checked_div(self.max_segment_count)
            .unwrap_or(0)
    }

    /// The fixed reference zone.
    ///
    /// Falls back to UTC for an out-of-range offset; [`validate`](Self::validate)
    /// rejects such configurations up front.
    pub fn zone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.zone_offset_secs).unwrap_or_else(|| Utc.fix())
    }

    /// Validates the configuration.
    ///
    /// Zero limits are valid: they turn every save into a skip.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the prefix or extension cannot form a
    /// file name, the zone offset is out of range, or a timestamp pattern
    /// does not survive a format/parse round trip at constant width.
    pub fn validate(&self) -> Result<()> {
        if self.file_prefix.is_empty() || self.file_prefix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidPrefix {
                prefix: self.file_prefix.clone(),
                reason: "must be non-empty and free of path separators".to_string(),
            }
            .into());
        }

        if self.file_extension.is_empty() || self.file_extension.contains(['/', '\\', '.']) {
            return Err(ConfigError::InvalidExtension {
                extension: self.file_extension.clone(),
            }
            .into());
        }

        let zone = FixedOffset::east_opt(self.zone_offset_secs).ok_or(
            ConfigError::InvalidZoneOffset {
                seconds: self.zone_offset_secs,
            },
        )?;

        check_round_trip(&self.file_name_pattern, zone)?;
        check_round_trip(&self.record_timestamp_pattern, Utc.fix())?;

        Ok(())
    }
}

/// Checks that `pattern` renders at a constant width and parses back to the
/// same millisecond-precision instant.
fn check_round_trip(pattern: &str, zone: FixedOffset) -> Result<()> {
    let invalid = |reason: &str| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let probe = DateTime::from_timestamp_millis(PROBE_MILLIS).ok_or_else(|| invalid("probe"))?;
    // Single-digit fields would change width on this second probe.
    let other = probe - TimeDelta::days(12) - TimeDelta::hours(9);

    let mut widths = Vec::with_capacity(2);
    for instant in [probe, other] {
        let rendered = instant.with_timezone(&zone).format(pattern).to_string();
        let parsed = NaiveDateTime::parse_from_str(&rendered, pattern)
            .map_err(|e| invalid(&e.to_string()))?;
        let back = zone
            .from_local_datetime(&parsed)
            .single()
            .ok_or_else(|| invalid("ambiguous local time"))?;
        if back.timestamp_millis() != instant.timestamp_millis() {
            return Err(invalid("does not keep millisecond precision").into());
        }
        widths.push(rendered.chars().count());
    }

    if widths[0] != widths[1] {
        return Err(invalid("rendered width is not constant").into());
    }
    Ok(())
}

/// Source of "now" for naming segments and stamping records.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Useful for driving rotation deterministically in tests and benchmarks.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock stopped at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
