//! Rotation decisions.
//!
//! [`RotationPolicy::decide`] looks at the size of the next record, the
//! segments on disk and the current time, and says what the store should
//! do with the record. It performs no I/O; the store carries out the
//! returned [`Action`].
//!
//! # Rules
//!
//! Checked in order, first match wins:
//!
//! 1. Either limit is 0, or the record is larger than one segment can
//!    hold: [`Action::Skip`].
//! 2. The latest segment was created on the same calendar day as `now`
//!    (in the fixed reference zone) and has room: [`Action::Append`].
//! 3. Below the count limit and the record fits the total budget:
//!    [`Action::Create`].
//! 4. Some segment exists: [`Action::Rotate`] out the oldest one.
//! 5. Otherwise [`Action::Skip`].

use chrono::{DateTime, FixedOffset, Utc};

use crate::config::StoreConfig;
use crate::segment::{self, SegmentMeta, SegmentNaming};

/// What to do with the next record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Append to this existing segment.
    Append(SegmentMeta),
    /// Create a new segment with this file name, then write.
    Create(String),
    /// Delete `drop`, create a segment named `name`, then write.
    Rotate {
        /// The oldest segment.
        drop: SegmentMeta,
        /// File name of the replacement.
        name: String,
    },
    /// Drop the record.
    Skip,
}

/// The size and count limits together with the naming scheme.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    max_total_bytes: u64,
    max_segment_count: u64,
    segment_capacity: u64,
    zone: FixedOffset,
    naming: SegmentNaming,
}

impl RotationPolicy {
    /// Builds the policy described by `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_total_bytes: config.max_total_bytes,
            max_segment_count: config.max_segment_count,
            segment_capacity: config.segment_capacity(),
            zone: config.zone(),
            naming: SegmentNaming::from_config(config),
        }
    }

    /// Byte capacity of one segment.
    pub fn segment_capacity(&self) -> u64 {
        self.segment_capacity
    }

    /// Decides what to do with a record of `record_size` bytes.
    ///
    /// `segments` may come in any order and may contain duplicates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use chrono::DateTime;
    /// use rotalog::config::StoreConfig;
    /// use rotalog::rotation::{Action, RotationPolicy};
    ///
    /// let policy = RotationPolicy::from_config(&StoreConfig::default());
    /// let now = DateTime::from_timestamp_millis(1_642_587_751_123).unwrap();
    /// assert_eq!(
    ///     policy.decide(64, &[], now),
    ///     Action::Create("main-2022-01-19 10-22-31 123.log".to_string()),
    /// );
    /// ```
    pub fn decide(&self, record_size: u64, segments: &[SegmentMeta], now: DateTime<Utc>) -> Action {
        let capacity = self.segment_capacity;
        if self.max_segment_count == 0 || self.max_total_bytes == 0 || record_size > capacity {
            return Action::Skip;
        }

        let ordered = segment::chronological(segments);

        if let Some(latest) = ordered.last()
            && self.same_day(latest.created(), now)
            && latest.size().saturating_add(record_size) <= capacity
        {
            return Action::Append(latest.clone());
        }

        let name = self.naming.name_for(now);
        let total: u64 = ordered.iter().map(SegmentMeta::size).sum();
        if (ordered.len() as u64) < self.max_segment_count
            && total.saturating_add(record_size) <= self.max_total_bytes
        {
            return Action::Create(name);
        }

        match ordered.into_iter().next() {
            Some(drop) => Action::Rotate { drop, name },
            None => Action::Skip,
        }
    }

    fn same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        a.with_timezone(&self.zone).date_naive() == b.with_timezone(&self.zone).date_naive()
    }
}
