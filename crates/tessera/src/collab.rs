//! Seams to the collaborators Tessera emits to but does not implement.
//!
//! - [`EventBus`]: receives every committed batch, at-least-once
//! - [`DeadLetterSink`]: receives copies of rejected or unreadable data
//! - [`NotificationChannel`]: ephemeral messages routed by cover, never logged
//!
//! Each comes with a no-op implementation (the default) and a recording
//! implementation that keeps everything in memory for inspection.

use std::fmt::{self, Debug, Display};
use std::sync::Mutex;

use bytes::Bytes;
use tessera_types::{Cover, EventBook, EventRecord, NewEvent, Timestamp};

/// Delivery failure reported by a collaborator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

pub type DeliveryResult = std::result::Result<(), CollaboratorError>;

// ============================================================================
// Event bus
// ============================================================================

/// Publishes committed batches to subscribers.
///
/// Delivery is at-least-once; subscribers deduplicate with their position.
pub trait EventBus: Send + Sync + Debug {
    fn publish(&self, book: &EventBook) -> DeliveryResult;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpBus;

impl EventBus for NoOpBus {
    fn publish(&self, _book: &EventBook) -> DeliveryResult {
        Ok(())
    }
}

/// Keeps every published book.
#[derive(Debug, Default)]
pub struct RecordingBus {
    published: Mutex<Vec<EventBook>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Books published so far, oldest first.
    pub fn published(&self) -> Vec<EventBook> {
        self.published
            .lock()
            .map(|books| books.clone())
            .unwrap_or_default()
    }
}

impl EventBus for RecordingBus {
    fn publish(&self, book: &EventBook) -> DeliveryResult {
        self.published
            .lock()
            .map_err(|_| CollaboratorError("recording bus lock poisoned".to_string()))?
            .push(book.clone());
        Ok(())
    }
}

// ============================================================================
// Dead letters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadLetterReason {
    SequenceConflict,
    PayloadRetrieval,
    TransformFailed,
}

impl Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeadLetterReason::SequenceConflict => "sequence_conflict",
            DeadLetterReason::PayloadRetrieval => "payload_retrieval",
            DeadLetterReason::TransformFailed => "transform_failed",
        };
        f.write_str(name)
    }
}

/// What was rejected: a batch that never committed, or committed records
/// that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterPayload {
    Events(Vec<NewEvent>),
    Records(Vec<EventRecord>),
}

impl DeadLetterPayload {
    pub fn len(&self) -> usize {
        match self {
            DeadLetterPayload::Events(events) => events.len(),
            DeadLetterPayload::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A copy of rejected or failed data, tagged for triage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Carries the correlation id of the failed operation.
    pub cover: Cover,
    pub reason: DeadLetterReason,
    /// Component that gave up, e.g. `"append"` or `"event-book"`.
    pub source: String,
    /// Rendered error.
    pub detail: String,
    pub payload: DeadLetterPayload,
}

pub trait DeadLetterSink: Send + Sync + Debug {
    fn send(&self, letter: DeadLetter) -> DeliveryResult;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpDeadLetters;

impl DeadLetterSink for NoOpDeadLetters {
    fn send(&self, _letter: DeadLetter) -> DeliveryResult {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
}

impl RecordingDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters
            .lock()
            .map(|letters| letters.clone())
            .unwrap_or_default()
    }
}

impl DeadLetterSink for RecordingDeadLetters {
    fn send(&self, letter: DeadLetter) -> DeliveryResult {
        self.letters
            .lock()
            .map_err(|_| CollaboratorError("dead-letter sink lock poisoned".to_string()))?
            .push(letter);
        Ok(())
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// An ephemeral message addressed by cover. Never sequenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub cover: Cover,
    pub payload: Bytes,
    pub sent_at: Timestamp,
}

pub trait NotificationChannel: Send + Sync + Debug {
    fn notify(&self, notification: Notification) -> DeliveryResult;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifications;

impl NotificationChannel for NoOpNotifications {
    fn notify(&self, _notification: Notification) -> DeliveryResult {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifications {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl NotificationChannel for RecordingNotifications {
    fn notify(&self, notification: Notification) -> DeliveryResult {
        self.sent
            .lock()
            .map_err(|_| CollaboratorError("notification channel lock poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
