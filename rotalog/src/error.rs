//! Error types for the rotalog segment store.
//!
//! Errors only travel between the internal layers. The store orchestrator
//! absorbs every [`SegmentError`] into a no-op plus a
//! [`StoreEvent`](crate::events::StoreEvent), so nothing here crosses the
//! [`Logger`](crate::logger::Logger) boundary. Configuration errors are the
//! exception: they are returned from constructors before any worker exists.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all rotalog operations.
#[derive(Error, Debug)]
pub enum RotalogError {
    /// Error validating a store configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error touching a segment file or the segment directory.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    /// The logger worker thread could not be started.
    #[error("failed to spawn logger worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Errors raised while validating a [`StoreConfig`](crate::config::StoreConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The segment file prefix is empty or contains a path separator.
    #[error("invalid file name prefix '{prefix}': {reason}")]
    InvalidPrefix {
        /// The rejected prefix.
        prefix: String,
        /// Why the prefix is invalid.
        reason: String,
    },

    /// The segment file extension is empty or contains a path separator.
    #[error("invalid file extension '{extension}'")]
    InvalidExtension {
        /// The rejected extension.
        extension: String,
    },

    /// A timestamp pattern does not render to a stable, parseable string.
    #[error("timestamp pattern '{pattern}' is not usable: {reason}")]
    InvalidPattern {
        /// The rejected strftime-style pattern.
        pattern: String,
        /// Why the pattern is unusable.
        reason: String,
    },

    /// The fixed reference zone offset is outside +/- 24h.
    #[error("fixed zone offset {seconds}s is out of range")]
    InvalidZoneOffset {
        /// The rejected offset in seconds east of UTC.
        seconds: i32,
    },
}

/// Errors raised by the segment store.
#[derive(Error, Debug)]
pub enum SegmentError {
    /// The segment directory could not be created or listed.
    #[error("failed to access segment directory '{}': {source}", path.display())]
    DirectoryAccess {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A segment file could not be created.
    #[error("failed to create segment '{}': {source}", path.display())]
    CreateFailed {
        /// The segment path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A segment file could not be opened for appending or written to.
    #[error("failed to write segment '{}': {source}", path.display())]
    WriteFailed {
        /// The segment path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A segment file could not be removed.
    #[error("failed to delete segment '{}': {source}", path.display())]
    DeleteFailed {
        /// The segment path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A segment file could not be opened or read.
    #[error("failed to read segment '{}' at offset {offset}: {source}", path.display())]
    ReadFailed {
        /// The segment path.
        path: PathBuf,
        /// The byte offset where reading started.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A file name does not follow `<prefix>-<timestamp>.<extension>`.
    #[error("file name '{name}' does not match the segment naming format")]
    InvalidFileName {
        /// The offending file name, lossily decoded.
        name: String,
    },
}

/// Type alias for `Result<T, RotalogError>`.
pub type Result<T> = std::result::Result<T, RotalogError>;
