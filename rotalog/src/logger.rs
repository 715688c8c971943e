//! The public logging handle.
//!
//! A [`Logger`] owns a [`Store`] running on a dedicated worker thread and
//! feeds it through one FIFO channel. Every operation becomes a unit of
//! work on that channel, so units run one at a time in the order they
//! were submitted:
//!
//! - logging calls stamp the record with the caller's clock reading and
//!   thread label, enqueue it and return at once;
//! - reads (`logs`, `log_files`) and `flush` enqueue a unit and block
//!   until the worker has run it.
//!
//! A read therefore sees every record logged before it, from any thread.
//! Dropping the logger drains the queue and joins the worker.
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::{TimeDelta, Utc};
//! use rotalog::config::StoreConfig;
//! use rotalog::logger::Logger;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let logger = Logger::new(StoreConfig::new("./logs"))?;
//!
//! logger.info("service started");
//! logger.request_in("{\"ok\":true}", "GET /health", 200);
//!
//! let now = Utc::now();
//! println!("{}", logger.logs(now - TimeDelta::hours(1), now));
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};

use crate::config::{Clock, StoreConfig, SystemClock};
use crate::error::{Result, RotalogError};
use crate::events::{EventFeed, StoreEvent};
use crate::record::{EventKind, LogRecord, ParamValue, Params, RecordFormatter};
use crate::segment::SegmentNaming;
use crate::store::Store;

/// Target of the `tracing` events emitted when mirroring is enabled.
pub const MIRROR_TARGET: &str = "rotalog::mirror";

/// One unit of work for the worker.
enum Command {
    Write(LogRecord),
    Query {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reply_tx: Sender<String>,
    },
    Files {
        reply_tx: Sender<Vec<PathBuf>>,
    },
    Flush {
        reply_tx: Sender<()>,
    },
}

/// A file found in the log directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    path: PathBuf,
    created: DateTime<Utc>,
}

impl LogFile {
    /// Full path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creation time: decoded from the name for segments, otherwise taken
    /// from the filesystem.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// The whole file as text, or an empty string if it cannot be read.
    pub fn content(&self) -> String {
        fs::read(&self.path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

/// Thread-safe logging handle over a segment store.
///
/// `Logger` is `Send + Sync`; share it between threads behind an `Arc`.
#[derive(Debug)]
pub struct Logger {
    /// Sending half of the work queue; `None` once shutdown has begun.
    cmd_tx: Option<Sender<Command>>,
    /// The worker thread.
    worker: Option<JoinHandle<()>>,
    /// Stamps records at the call site.
    clock: Arc<dyn Clock>,
    /// Shared with the store for subscriptions.
    events: Arc<EventFeed>,
    /// Segment directory.
    directory: PathBuf,
    /// Decodes creation times for [`log_files`](Self::log_files).
    naming: SegmentNaming,
    /// Re-emit records through `tracing`.
    mirror: bool,
}

impl Logger {
    /// Opens a store in `config.directory` and starts the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::error::ConfigError) for an invalid
    /// configuration and [`RotalogError::WorkerSpawn`] if the worker thread
    /// cannot be started.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::from_store(Store::with_clock(config, clock)?)
    }

    /// Moves `store` onto a new worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`RotalogError::WorkerSpawn`] if the thread cannot be started.
    pub fn from_store(store: Store) -> Result<Self> {
        let config = store.config().clone();
        let formatter = RecordFormatter::from_config(&config);
        let clock = store.clock();
        let events = store.events();

        let (cmd_tx, cmd_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("rotalog-worker".to_string())
            .spawn(move || run_worker(store, &formatter, &cmd_rx))
            .map_err(RotalogError::WorkerSpawn)?;

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            worker: Some(worker),
            clock,
            events,
            directory: config.directory.clone(),
            naming: SegmentNaming::from_config(&config),
            mirror: config.mirror_to_tracing,
        })
    }

    /// Logs one record.
    ///
    /// The timestamp and the calling thread's label are captured before
    /// this returns; formatting and writing happen on the worker.
    pub fn log(
        &self,
        kind: EventKind,
        message: impl Into<String>,
        params: Option<Params>,
        tag: Option<&str>,
    ) {
        let mut record = LogRecord::new(self.clock.now(), kind, message);
        record.thread = Some(current_thread_label());
        record.tag = tag.map(str::to_string);
        record.params = params;

        if self.mirror {
            mirror(&record);
        }
        self.send(Command::Write(record));
    }

    /// Logs application state detail.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(EventKind::Debug, message, None, None);
    }

    /// Logs general information.
    pub fn info(&self, message: impl Into<String>) {
        self.log(EventKind::Info, message, None, None);
    }

    /// Logs a recovered problem.
    pub fn warning(&self, message: impl Into<String>) {
        self.log(EventKind::Warning, message, None, None);
    }

    /// Logs a failed operation.
    pub fn error(&self, message: impl Into<String>) {
        self.log(EventKind::Error, message, None, None);
    }

    /// Logs a critical failure.
    pub fn critical(&self, message: impl Into<String>) {
        self.log(EventKind::Critical, message, None, None);
    }

    /// Logs a user-defined event under `label`.
    pub fn user(&self, message: impl Into<String>, label: &str) {
        self.log(EventKind::User(label.to_string()), message, None, None);
    }

    /// Logs an outgoing request.
    pub fn request_out(&self, message: impl Into<String>) {
        self.log(EventKind::RequestOut, message, None, None);
    }

    /// Logs an incoming response as `"<operation>, <status>"` followed by
    /// the indented body on the next line.
    pub fn request_in(&self, message: &str, operation: &str, status: u16) {
        let text = format!("{operation}, {status}\n  --->>  {message}");
        self.log(EventKind::RequestIn, text, None, None);
    }

    /// Returns the records with `start <= timestamp <= end`, joined by `\n`.
    ///
    /// Blocks until every unit submitted before this call has run.
    pub fn logs(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        self.request(|reply_tx| Command::Query {
            start,
            end,
            reply_tx,
        })
    }

    /// Files in the log directory, newest first.
    pub fn log_files(&self) -> Vec<LogFile> {
        let paths = self.request(|reply_tx| Command::Files { reply_tx });
        let mut files: Vec<LogFile> = paths
            .into_iter()
            .map(|path| {
                let created = path
                    .file_name()
                    .and_then(|name| self.naming.parse(name).ok())
                    .unwrap_or_else(|| filesystem_time(&path));
                LogFile { path, created }
            })
            .collect();
        files.sort_by(|a, b| b.created.cmp(&a.created));
        files
    }

    /// The newest file in the log directory.
    pub fn last_log_file(&self) -> Option<LogFile> {
        self.log_files().into_iter().next()
    }

    /// Directory where the segments are stored.
    pub fn logs_folder_path(&self) -> &Path {
        &self.directory
    }

    /// Blocks until every unit submitted before this call has run.
    pub fn flush(&self) {
        self.request(|reply_tx| Command::Flush { reply_tx });
    }

    /// Subscribes to store events.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) -> bool {
        self.cmd_tx
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok())
    }

    fn request<T: Default>(&self, command: impl FnOnce(Sender<T>) -> Command) -> T {
        let (reply_tx, reply_rx) = mpsc::channel();
        if !self.send(command(reply_tx)) {
            tracing::warn!("logger worker is gone");
            return T::default();
        }
        reply_rx.recv().unwrap_or_default()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish what is already in it.
        drop(self.cmd_tx.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("logger worker panicked");
        }
    }
}

fn run_worker(mut store: Store, formatter: &RecordFormatter, cmd_rx: &Receiver<Command>) {
    tracing::debug!(directory = %store.directory().display(), "logger worker started");
    for command in cmd_rx {
        match command {
            Command::Write(record) => store.save_at(&formatter.format(&record), record.timestamp),
            Command::Query {
                start,
                end,
                reply_tx,
            } => {
                let _ = reply_tx.send(store.query(start, end));
            }
            Command::Files { reply_tx } => {
                let _ = reply_tx.send(store.list_files());
            }
            Command::Flush { reply_tx } => {
                let _ = reply_tx.send(());
            }
        }
    }
    tracing::debug!("logger worker stopped");
}

/// The calling thread's name, or `thread=0x<hex id>` for unnamed threads.
fn current_thread_label() -> String {
    let current = thread::current();
    if let Some(name) = current.name() {
        return name.to_string();
    }
    let id = format!("{:?}", current.id());
    let digits = id.trim_start_matches("ThreadId(").trim_end_matches(')');
    match digits.parse::<u64>() {
        Ok(id) => format!("thread={id:#08x}"),
        Err(_) => format!("thread={digits}"),
    }
}

fn filesystem_time(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|metadata| metadata.created().or_else(|_| metadata.modified()))
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

fn mirror(record: &LogRecord) {
    let mut text = match &record.tag {
        Some(tag) => format!("[{tag}] {}", record.message),
        None => record.message.clone(),
    };
    if let Some(params) = &record.params {
        text = format!("{text} {}", ParamValue::Map(params.clone()).to_json());
    }

    let kind = record.kind.mark();
    match record.kind {
        EventKind::Debug | EventKind::User(_) => {
            tracing::debug!(target: MIRROR_TARGET, kind = kind.as_str(), "{text}");
        }
        EventKind::Info | EventKind::RequestOut | EventKind::RequestIn => {
            tracing::info!(target: MIRROR_TARGET, kind = kind.as_str(), "{text}");
        }
        EventKind::Warning => tracing::warn!(target: MIRROR_TARGET, kind = kind.as_str(), "{text}"),
        EventKind::Error | EventKind::Critical => {
            tracing::error!(target: MIRROR_TARGET, kind = kind.as_str(), "{text}");
        }
    }
}
