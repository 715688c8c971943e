//! # rotalog
//!
//! Embedded, file-backed, append-only log store with rotating segments.
//!
//! rotalog writes log records as text lines into a directory of segment
//! files bounded by a total byte budget and a segment count, and reads them
//! back by time window. It is meant to be embedded in applications that
//! need a local, self-limiting record of what happened.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Bounded storage: at most `max_segment_count` segments, each holding
//!   at most `max_total_bytes / max_segment_count` bytes of records
//! - One segment per day at most: the first record of a new day starts a
//!   new segment, the oldest segment is deleted when the limits are reached
//! - Creation times live in the file names; no index files
//! - Time-window queries read whole segments only when they lie inside the
//!   window and scan the boundary segments line by line
//! - One worker thread serializes every write and read
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rotalog::{EventKind, Logger, StoreConfig};
//! use chrono::{TimeDelta, Utc};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 4 MiB across at most 8 segments
//! let config = StoreConfig::new("./logs").with_limits(4 * 1024 * 1024, 8);
//! let logger = Logger::new(config)?;
//!
//! logger.info("service started");
//! logger.log(EventKind::Warning, "cache miss", None, Some("CACHE"));
//!
//! // Everything from the last hour
//! let now = Utc::now();
//! println!("{}", logger.logs(now - TimeDelta::hours(1), now));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Logger`]: Thread-safe handle; owns the worker running a [`Store`]
//! - [`Store`]: Single-threaded orchestrator: save, query, list
//! - [`StoreConfig`]: Directory, naming formats, rotation limits
//! - [`StoreEvent`]: Absorbed failures and segment changes, for observers
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`logger`]: Worker thread and the logging API
//! - [`store`]: Save/query orchestration
//! - [`rotation`]: Append/create/rotate/skip decisions
//! - [`extract`]: Time-window reconstruction
//! - [`storage`]: Segment files and the open write handle
//! - [`segment`]: Segment metadata and file naming
//! - [`record`]: Record line formatting and timestamp parsing
//! - [`header`]: Segment header block
//! - [`events`]: Store event feed
//! - [`config`]: Configuration and clocks
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod header;
pub mod logger;
pub mod record;
pub mod rotation;
pub mod segment;
pub mod storage;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use config::{Clock, ManualClock, StoreConfig, SystemClock};
pub use error::{Result, RotalogError};
pub use events::StoreEvent;
pub use logger::{LogFile, Logger};
pub use record::{EventKind, LogRecord, ParamValue, Params};
pub use rotation::{Action, RotationPolicy};
pub use segment::SegmentMeta;
pub use store::Store;
