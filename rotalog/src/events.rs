//! Store events for observers.
//!
//! Failures inside the store never reach the caller of `save`; they turn
//! into a no-op. Subscribers of the [`EventFeed`] still get to see them,
//! together with segment lifecycle changes and policy skips.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Something that happened inside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A new segment was created.
    SegmentCreated {
        /// Path of the new segment.
        path: PathBuf,
    },
    /// The oldest segment was replaced by a new one.
    SegmentRotated {
        /// Path of the deleted segment.
        dropped: PathBuf,
        /// Path of the new segment.
        created: PathBuf,
    },
    /// A file with an unparseable name was removed during a listing.
    CorruptSegmentRemoved {
        /// Path of the removed file.
        path: PathBuf,
    },
    /// A record was dropped by the rotation policy.
    RecordSkipped {
        /// Size charged for the dropped record.
        record_size: u64,
    },
    /// A filesystem operation failed and was absorbed.
    OperationFailed {
        /// What the store was doing.
        operation: &'static str,
        /// Rendered error.
        error: String,
    },
}

/// Events buffered per subscriber before new ones are dropped.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Fan-out of [`StoreEvent`]s to any number of subscribers.
///
/// Each subscriber gets a bounded buffer. When it is full, further events
/// are dropped for that subscriber until it catches up. Subscribers whose
/// receiver was dropped are pruned on the next emit.
#[derive(Debug)]
pub struct EventFeed {
    subscribers: Mutex<Vec<SyncSender<StoreEvent>>>,
    capacity: usize,
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl EventFeed {
    /// Creates a feed with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a feed buffering at most `capacity` events per subscriber.
    ///
    /// A capacity of 0 is raised to 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to events emitted from now on.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Sends `event` to every live subscriber without blocking.
    pub fn emit(&self, event: StoreEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
