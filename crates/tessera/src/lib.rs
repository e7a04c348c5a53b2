//! # Tessera
//!
//! Event-sourcing core: an append-only, per-aggregate event log with
//! optimistic concurrency, snapshot acceleration, isolated timelines
//! ("editions"), content-addressed offloading of large payloads and
//! on-read schema migration ("upcasting"), plus a consumer checkpoint store.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────── Tessera ─────────────────────────────┐
//! │  append ──► PayloadStore.externalize ──► EventLog (CAS) ──► bus  │
//! │  read   ◄── Upcaster ◄── PayloadStore.resolve ◄── EventLog       │
//! │             SnapshotStore      PositionStore     EditionIndex     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use tessera::{Cover, NewEvent, Retention, Selector, Sequence, Tessera};
//!
//! let tessera = Tessera::builder().build();
//! let cover = Cover::new("player", tessera::Uuid::new_v4());
//!
//! tessera.append(&cover, Sequence::ZERO, vec![
//!     NewEvent::new("Registered", "alice"),
//!     NewEvent::new("Deposited", "10"),
//! ])?;
//! tessera.put_snapshot(&cover, Sequence::new(1), "balance=10".into(), Retention::Default)?;
//!
//! let book = tessera.get_event_book(&cover, &Selector::Latest)?;
//! assert!(book.snapshot.is_some());
//! assert!(book.records.is_empty());
//! # Ok::<(), tessera::TesseraError>(())
//! ```

mod collab;
mod error;
mod selector;
mod tessera;

pub use collab::{
    CollaboratorError, DeadLetter, DeadLetterPayload, DeadLetterReason, DeadLetterSink,
    DeliveryResult, EventBus, NoOpBus, NoOpDeadLetters, NoOpNotifications, Notification,
    NotificationChannel, RecordingBus, RecordingDeadLetters, RecordingNotifications,
};
pub use error::{Result, TesseraError};
pub use selector::{PointInTime, Selector};
pub use tessera::{Tessera, TesseraBuilder};

// Re-export core types
pub use tessera_types::{
    ContentHash, Cover, Edition, EventBook, EventRecord, MAIN_EDITION, MAIN_EDITION_ALIAS, NewEvent,
    Payload,
    PayloadReference, Position, PositionKey, Retention, Sequence, Snapshot, StorageType,
    StreamKey, Timestamp, Uuid,
};

// Re-export storage components for advanced usage
pub use tessera_storage::{
    BlobBackend, Clock, ErrorKind, FsBlobs, ManualClock, MemoryBlobs, PayloadStats, PayloadStore,
    StorageError, SweepReport, SystemClock, UpcastRule, Upcaster, UpcasterBuilder,
};

pub use tessera_config::TesseraConfig;
