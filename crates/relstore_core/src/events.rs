//! Event feed for observing adapter outcomes.
//!
//! The record manager learns what happened to a save through this feed:
//! one [`AdapterEvent::RecordSaved`] per record of a successful batch, a
//! [`AdapterEvent::RelationshipUpdated`] for each belongs-to relationship
//! the save touched, or a single [`AdapterEvent::BatchFailed`].
//!
//! Events are emitted only after every operation of a batch has finished.
//!
//! # Usage
//!
//! ```rust
//! use relstore_codec::CompositeId;
//! use relstore_core::{AdapterEvent, EventFeed};
//!
//! let feed = EventFeed::new();
//! let receiver = feed.subscribe();
//!
//! feed.emit(AdapterEvent::RecordSaved {
//!     id: CompositeId::new("Post", "1"),
//!     hash: None,
//! });
//!
//! let record = receiver.recv().unwrap();
//! assert_eq!(record.sequence, 1);
//! ```

use parking_lot::RwLock;
use relstore_codec::{CompositeId, StoredHash};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// Something the adapter reports to the record manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// A record of the batch was written. `hash` is the stored hash for
    /// created and updated records and `None` for deleted ones.
    RecordSaved {
        /// The record.
        id: CompositeId,
        /// What was stored.
        hash: Option<StoredHash>,
    },
    /// A belongs-to relationship of a record is now persisted.
    RelationshipUpdated {
        /// The record owning the relationship.
        id: CompositeId,
        /// Relationship name.
        name: String,
    },
    /// A batch failed. No `RecordSaved` is sent for any of its records.
    BatchFailed {
        /// Batch number assigned by the adapter.
        batch: u64,
        /// Rendered error.
        error: String,
    },
}

/// An event with its position in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Sequence number, starting at 1.
    pub sequence: u64,
    /// The event.
    pub event: AdapterEvent,
}

struct FeedState {
    subscribers: Vec<Sender<EventRecord>>,
    next_sequence: u64,
}

/// Distributes adapter events to subscribers.
///
/// The feed:
/// - Preserves emission order
/// - Supports multiple subscribers
/// - Keeps a bounded history for polling
/// - Is thread-safe
pub struct EventFeed {
    state: RwLock<FeedState>,
    history: RwLock<VecDeque<EventRecord>>,
    max_history: usize,
}

impl EventFeed {
    /// Creates a new event feed.
    pub fn new() -> Self {
        Self::with_max_history(1000)
    }

    /// Creates an event feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            state: RwLock::new(FeedState {
                subscribers: Vec::new(),
                next_sequence: 1,
            }),
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver that will receive all future events.
    pub fn subscribe(&self) -> Receiver<EventRecord> {
        let (tx, rx) = mpsc::channel();
        self.state.write().subscribers.push(tx);
        rx
    }

    /// Emits an event to all subscribers and returns its sequence number.
    pub fn emit(&self, event: AdapterEvent) -> u64 {
        let mut state = self.state.write();
        let record = EventRecord {
            sequence: state.next_sequence,
            event,
        };
        state.next_sequence += 1;

        {
            let mut history = self.history.write();
            history.push_back(record.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        // Disconnected subscribers are dropped here.
        state
            .subscribers
            .retain(|tx| tx.send(record.clone()).is_ok());
        record.sequence
    }

    /// Emits several events in order.
    pub fn emit_batch(&self, events: impl IntoIterator<Item = AdapterEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Returns events with sequence > `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<EventRecord> {
        self.history
            .read()
            .iter()
            .filter(|r| r.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number emitted, or 0.
    pub fn latest_sequence(&self) -> u64 {
        self.state.read().next_sequence - 1
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("latest_sequence", &self.latest_sequence())
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history_len())
            .finish()
    }
}
