//! Time-range extraction.
//!
//! A query for `[start, end]` reads as little as it can:
//!
//! - segments created inside the window, other than the boundaries, are
//!   read whole from the end of their header block;
//! - the segment that was open at `start` and the last one created before
//!   `end` are scanned line by line, keeping only records inside the
//!   window.
//!
//! A record is its first line plus every following line that does not
//! start with a record timestamp. Because segments are appended in time
//! order, the scan of a boundary segment stops at the first record newer
//! than `end`.

use chrono::{DateTime, Utc};

use crate::config::StoreConfig;
use crate::header::HeaderBlock;
use crate::record::RecordFormatter;
use crate::segment::{self, SegmentMeta};
use crate::storage::SegmentStore;

/// How a segment takes part in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Everything after the header block.
    Full,
    /// Only the records inside the window.
    Partial,
}

/// One segment read planned for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRead {
    /// The segment to read.
    pub segment: SegmentMeta,
    /// How to read it.
    pub mode: ReadMode,
}

/// Reassembles the records of a time window from the segment files.
#[derive(Debug, Clone)]
pub struct RangeExtractor {
    formatter: RecordFormatter,
}

impl RangeExtractor {
    /// Builds an extractor that recognizes records the way `config` writes them.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            formatter: RecordFormatter::from_config(config),
        }
    }

    /// Returns the records with `start <= timestamp <= end`, joined by `\n`.
    ///
    /// Each record keeps its continuation lines. An empty store, an empty
    /// window or unreadable segments produce an empty string.
    ///
    /// Stored timestamps and segment names only keep millisecond precision,
    /// so `start` is rounded down to it first.
    pub fn extract(
        &self,
        storage: &mut SegmentStore,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> String {
        let start = self.formatter.truncate(start);
        let segments = match storage.list_segments() {
            Ok(segments) => segments,
            Err(error) => {
                tracing::warn!(%error, "cannot list segments for query");
                return String::new();
            }
        };

        let mut contributions = Vec::new();
        for read in plan(&segments, start, end) {
            let text = match read.mode {
                ReadMode::Full => self.read_full(storage, &read.segment),
                ReadMode::Partial => self.read_partial(storage, &read.segment, start, end),
            };
            let trimmed = text.trim_matches(['\n', '\r']);
            if !trimmed.is_empty() {
                contributions.push(trimmed.to_string());
            }
        }
        contributions.join("\n")
    }

    fn read_full(&self, storage: &SegmentStore, segment: &SegmentMeta) -> String {
        let offset = header_len(storage, segment);
        storage.read_from(segment, offset).unwrap_or_else(|error| {
            tracing::warn!(%error, "skipping unreadable segment");
            String::new()
        })
    }

    fn read_partial(
        &self,
        storage: &SegmentStore,
        segment: &SegmentMeta,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> String {
        let lines = match storage.reader_for(segment) {
            Ok(lines) => lines,
            Err(error) => {
                tracing::warn!(%error, "skipping unreadable segment");
                return String::new();
            }
        };

        let mut output = String::new();
        let mut record = String::new();
        for line in lines {
            match self.formatter.parse_prefix(&line) {
                Some(timestamp) => {
                    output.push_str(&record);
                    record.clear();
                    if timestamp > end {
                        return output;
                    }
                    if timestamp >= start {
                        record = line;
                    }
                }
                None if !record.is_empty() => record.push_str(&line),
                None => {}
            }
        }
        output.push_str(&record);
        output
    }
}

/// Chooses which segments a query for `[start, end]` reads, and how.
///
/// The result is ordered by creation time.
pub fn plan(segments: &[SegmentMeta], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<PlannedRead> {
    let ordered = segment::chronological(segments);

    let start_boundary = ordered.iter().rev().find(|s| s.created() <= start);
    let end_boundary = ordered
        .iter()
        .rev()
        .find(|s| s.created() <= end && s.created() > start);

    let mut reads: Vec<PlannedRead> = start_boundary
        .into_iter()
        .chain(end_boundary)
        .map(|segment| PlannedRead {
            segment: segment.clone(),
            mode: ReadMode::Partial,
        })
        .collect();
    reads.dedup_by(|a, b| a.segment.same_file(&b.segment));

    for segment in &ordered {
        let is_boundary = reads.iter().any(|read| read.segment.same_file(segment));
        if !is_boundary && segment.created() >= start && segment.created() < end {
            reads.push(PlannedRead {
                segment: segment.clone(),
                mode: ReadMode::Full,
            });
        }
    }

    reads.sort_by_key(|read| read.segment.created());
    reads
}

/// Byte length of the header block of `segment`, up to its blank line.
///
/// A segment without a complete header yields its whole length.
fn header_len(storage: &SegmentStore, segment: &SegmentMeta) -> u64 {
    let Ok(lines) = storage.reader_for(segment) else {
        return 0;
    };
    let mut len = 0;
    for line in lines {
        if HeaderBlock::is_terminator(&line) {
            break;
        }
        len += SegmentStore::size_in_bytes(&line);
    }
    len
}
