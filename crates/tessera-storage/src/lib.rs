//! # tessera-storage: the storage and versioning core of `Tessera`
//!
//! Six components, leaves first:
//!
//! - [`PayloadStore`]: content-addressed blob store for oversized payloads,
//!   with dedup and a mark-sweep TTL reclaim
//! - [`Upcaster`]: immutable chain of per-type transforms applied on read
//! - [`EditionIndex`]: resolves edition aliases and bounds edition deletion
//! - [`EventLog`]: the append-only, sequence-numbered system of record
//! - [`SnapshotStore`]: materialized state checkpoints per stream
//! - [`PositionStore`]: consumer checkpoints, independent of the log
//!
//! Every component is `Send + Sync` and safe to share behind an `Arc`.
//! Appends to one stream are linearized by a per-stream lock; different
//! streams never contend.

mod blobs;
mod clock;
mod edition;
mod error;
mod event_log;
mod payload;
mod position;
mod snapshot;
mod upcast;


pub use blobs::{BlobBackend, BlobEntry, FsBlobs, MemoryBlobs};
pub use clock::{Clock, ManualClock, SystemClock};
pub use edition::{EditionIndex, Partition};
pub use error::{ErrorKind, Result, StorageError};
pub use event_log::EventLog;
pub use payload::{DEFAULT_OFFLOAD_THRESHOLD, PayloadStats, PayloadStore, SweepReport};
pub use position::PositionStore;
pub use snapshot::{DEFAULT_MILESTONE_INTERVAL, SnapshotStore};
pub use upcast::{TransformFn, UpcastRule, Upcaster, UpcasterBuilder};
