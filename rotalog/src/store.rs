//! Store orchestrator for the rotalog segment store.
//!
//! This module ties the rotation policy, the segment store and the range
//! extractor together into the three store operations: save a line, query
//! a time window, list the files.
//!
//! # Design
//!
//! The Store is single-threaded and owns the only write handle:
//! - `save` lists the segments, asks the [`RotationPolicy`] for an
//!   [`Action`] and carries it out
//! - a new segment always starts with its header block
//! - a rotation deletes the oldest segment before creating the new one
//! - filesystem failures are absorbed: the save becomes a no-op, a
//!   `tracing` warning is logged and a [`StoreEvent`] is emitted
//!
//! Concurrent callers go through [`Logger`](crate::logger::Logger), which
//! runs a Store on its own worker thread.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use rotalog::config::StoreConfig;
//! use rotalog::store::Store;
//! use chrono::{TimeDelta, Utc};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = Store::open(StoreConfig::new("./logs"))?;
//!
//! store.save("2022-01-19 10:22:31.123Z I service started");
//!
//! let now = Utc::now();
//! let text = store.query(now - TimeDelta::days(1), now);
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use chrono::{DateTime, Utc};

use crate::config::{Clock, StoreConfig, SystemClock};
use crate::error::{Result, SegmentError};
use crate::events::{EventFeed, StoreEvent};
use crate::extract::RangeExtractor;
use crate::header::HeaderBlock;
use crate::rotation::{Action, RotationPolicy};
use crate::segment::SegmentMeta;
use crate::storage::SegmentStore;

/// Top-level handle of a segment store.
#[derive(Debug)]
pub struct Store {
    /// Configuration the store was opened with.
    config: StoreConfig,
    /// Segment files and the open write handle.
    storage: SegmentStore,
    /// Append/create/rotate/skip decisions.
    policy: RotationPolicy,
    /// Header block renderer for new segments.
    header: HeaderBlock,
    /// Time-window reader.
    extractor: RangeExtractor,
    /// Source of "now".
    clock: Arc<dyn Clock>,
    /// Observers of absorbed failures and segment changes.
    events: Arc<EventFeed>,
}

impl Store {
    /// Opens a store using the system clock.
    ///
    /// The directory is not touched until the first save; a missing
    /// directory reads as an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::error::ConfigError) if the
    /// configuration does not validate.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use rotalog::config::StoreConfig;
    /// # use rotalog::store::Store;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = Store::open(StoreConfig::new("./logs").with_limits(1 << 20, 4))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Opens a store that takes "now" from `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::error::ConfigError) if the
    /// configuration does not validate.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventFeed::new());
        Ok(Self {
            storage: SegmentStore::new(&config, Arc::clone(&events)),
            policy: RotationPolicy::from_config(&config),
            header: HeaderBlock::from_config(&config),
            extractor: RangeExtractor::from_config(&config),
            clock,
            events,
            config,
        })
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The store's clock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// The store's event feed.
    pub fn events(&self) -> Arc<EventFeed> {
        Arc::clone(&self.events)
    }

    /// Subscribes to store events.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Persists one formatted record line.
    ///
    /// The line is written followed by `\n`. Whether it is appended, starts
    /// a new segment, replaces the oldest segment or is dropped is up to the
    /// [`RotationPolicy`]; only the bytes of `line` are charged against the
    /// limits.
    ///
    /// Never fails: filesystem errors turn the save into a no-op and are
    /// reported through [`subscribe`](Self::subscribe).
    pub fn save(&mut self, line: &str) {
        let now = self.clock.now();
        self.save_at(line, now);
    }

    /// Like [`save`](Self::save), with `now` as the instant the record was
    /// stamped.
    ///
    /// `now` drives the rotation decision and names any new segment, so a
    /// segment is never named after the records it holds.
    pub fn save_at(&mut self, line: &str, now: DateTime<Utc>) {
        let size = SegmentStore::size_in_bytes(line);
        let segments = match self.storage.list_segments() {
            Ok(segments) => segments,
            Err(error) => {
                self.absorb("list segments", &error);
                return;
            }
        };

        let action = self.policy.decide(size, &segments, now);
        tracing::debug!(?action, size, "save");

        let record = format!("{line}\n");
        match action {
            Action::Append(segment) => {
                if let Err(error) = self.storage.append(&record, &segment) {
                    self.absorb("append record", &error);
                }
            }
            Action::Create(name) => match self.storage.create_segment(&name) {
                Ok(segment) => {
                    self.events.emit(StoreEvent::SegmentCreated {
                        path: segment.path().to_path_buf(),
                    });
                    self.write_new(&segment, &record);
                }
                Err(error) => self.absorb("create segment", &error),
            },
            Action::Rotate { drop, name } => match self.storage.rotate(&drop, &name) {
                Ok(segment) => {
                    tracing::info!(
                        dropped = %drop.path().display(),
                        created = %segment.path().display(),
                        "rotated segment"
                    );
                    self.events.emit(StoreEvent::SegmentRotated {
                        dropped: drop.path().to_path_buf(),
                        created: segment.path().to_path_buf(),
                    });
                    self.write_new(&segment, &record);
                }
                Err(error) => self.absorb("rotate segment", &error),
            },
            Action::Skip => {
                self.events
                    .emit(StoreEvent::RecordSkipped { record_size: size });
            }
        }
    }

    fn write_new(&mut self, segment: &SegmentMeta, record: &str) {
        let header = self.header.render(segment.created());
        let written = self
            .storage
            .append(&header, segment)
            .and_then(|()| self.storage.append(record, segment));
        if let Err(error) = written {
            self.absorb("write new segment", &error);
        }
    }

    fn absorb(&self, operation: &'static str, error: &SegmentError) {
        tracing::warn!(operation, %error, "store operation failed");
        self.events.emit(StoreEvent::OperationFailed {
            operation,
            error: error.to_string(),
        });
    }

    /// Returns the records with `start <= timestamp <= end`, joined by `\n`.
    pub fn query(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        self.extractor.extract(&mut self.storage, start, end)
    }

    /// Paths of every file in the segment directory, sorted by name.
    ///
    /// An unreadable directory lists as empty.
    pub fn list_files(&self) -> Vec<PathBuf> {
        self.storage.list_files().unwrap_or_else(|error| {
            self.absorb("list files", &error);
            Vec::new()
        })
    }

    /// Metadata of every segment, oldest first.
    ///
    /// Files with unparseable names are removed on the way.
    pub fn segments(&mut self) -> Vec<SegmentMeta> {
        match self.storage.list_segments() {
            Ok(segments) => segments,
            Err(error) => {
                self.absorb("list segments", &error);
                Vec::new()
            }
        }
    }

    /// Directory holding the segments.
    pub fn directory(&self) -> PathBuf {
        self.storage.directory().to_path_buf()
    }
}
