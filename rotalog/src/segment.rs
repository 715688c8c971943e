//! Segment metadata and the segment naming scheme.
//!
//! A segment's creation time lives only in its file name:
//!
//! ```text
//! <prefix>-<timestamp>.<extension>
//! main-2022-01-19 10-22-31 123.log
//! ```
//!
//! All name parsing and formatting goes through [`SegmentNaming`], so a
//! change of format touches one place. A name is accepted only when its
//! timestamp re-renders to exactly the same text.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::config::StoreConfig;
use crate::error::SegmentError;

/// Metadata of one segment file.
///
/// Two metas describe the same segment when their paths are equal; the
/// creation time and size are snapshots taken when the meta was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Full path of the segment file.
    path: PathBuf,
    /// Creation instant decoded from the file name.
    created: DateTime<Utc>,
    /// Size in bytes at the time of the snapshot.
    size: u64,
}

impl SegmentMeta {
    /// Creates a metadata snapshot.
    pub fn new(path: impl Into<PathBuf>, created: DateTime<Utc>, size: u64) -> Self {
        Self {
            path: path.into(),
            created,
            size,
        }
    }

    /// Full path of the segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component of the path.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
    }

    /// Creation instant, decoded from the file name.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns `true` if both metas point at the same file.
    pub fn same_file(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

/// Drops later duplicates (by path), keeping input order otherwise.
pub(crate) fn dedup_by_path(segments: &[SegmentMeta]) -> Vec<SegmentMeta> {
    let mut unique: Vec<SegmentMeta> = Vec::with_capacity(segments.len());
    for segment in segments {
        if !unique.iter().any(|seen| seen.same_file(segment)) {
            unique.push(segment.clone());
        }
    }
    unique
}

/// De-duplicates by path and stable-sorts ascending by creation time.
pub(crate) fn chronological(segments: &[SegmentMeta]) -> Vec<SegmentMeta> {
    let mut ordered = dedup_by_path(segments);
    ordered.sort_by_key(SegmentMeta::created);
    ordered
}

/// Formats and parses segment file names.
#[derive(Debug, Clone)]
pub struct SegmentNaming {
    prefix: String,
    extension: String,
    pattern: String,
    zone: FixedOffset,
}

impl SegmentNaming {
    /// Builds the naming scheme described by `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            prefix: config.file_prefix.clone(),
            extension: config.file_extension.clone(),
            pattern: config.file_name_pattern.clone(),
            zone: config.zone(),
        }
    }

    /// Renders the file name of a segment created at `instant`.
    ///
    /// ```rust
    /// use chrono::DateTime;
    /// use rotalog::config::StoreConfig;
    /// use rotalog::segment::SegmentNaming;
    ///
    /// let naming = SegmentNaming::from_config(&StoreConfig::default());
    /// let instant = DateTime::from_timestamp_millis(1_642_587_751_123).unwrap();
    /// assert_eq!(naming.name_for(instant), "main-2022-01-19 10-22-31 123.log");
    /// ```
    pub fn name_for(&self, instant: DateTime<Utc>) -> String {
        format!(
            "{}-{}.{}",
            self.prefix,
            self.render(instant),
            self.extension
        )
    }

    /// Decodes the creation instant from a file name.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidFileName`] if the name is not UTF-8,
    /// lacks the prefix or extension, or its timestamp does not round-trip.
    pub fn parse(&self, file_name: &OsStr) -> Result<DateTime<Utc>, SegmentError> {
        let invalid = || SegmentError::InvalidFileName {
            name: file_name.to_string_lossy().into_owned(),
        };

        let name = file_name.to_str().ok_or_else(invalid)?;
        let stamp = name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(self.extension.as_str()))
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(invalid)?;

        let local = NaiveDateTime::parse_from_str(stamp, &self.pattern).map_err(|_| invalid())?;
        let created = self
            .zone
            .from_local_datetime(&local)
            .single()
            .ok_or_else(invalid)?
            .with_timezone(&Utc);

        if self.render(created) != stamp {
            return Err(invalid());
        }
        Ok(created)
    }

    fn render(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.zone)
            .format(&self.pattern)
            .to_string()
    }
}
