//! Snapshot storage keyed by stream.
//!
//! Each stream has at most one *current* snapshot plus any number of
//! *milestones* keyed by sequence:
//!
//! | Retention   | Replaces current | Kept as milestone                      |
//! |-------------|------------------|----------------------------------------|
//! | `Transient` | yes              | never                                  |
//! | `Default`   | yes              | every `milestone_interval` records     |
//! | `Persist`   | only if none     | always; never overwritten              |
//!
//! The store does not consult the event log. Whether a snapshot is still
//! behind the stream head is the caller's check.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use tessera_types::{ContentHash, Payload, Retention, Sequence, Snapshot, StreamKey};

use crate::{Partition, Result, StorageError};

/// Default interval at which `Default` snapshots are also kept as milestones.
pub const DEFAULT_MILESTONE_INTERVAL: u64 = 16;

#[derive(Debug, Default)]
struct StreamSnapshots {
    current: Option<Snapshot>,
    milestones: BTreeMap<Sequence, Snapshot>,
}

/// Latest-state checkpoints per stream.
#[derive(Debug)]
pub struct SnapshotStore {
    streams: RwLock<HashMap<StreamKey, StreamSnapshots>>,
    milestone_interval: u64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_MILESTONE_INTERVAL)
    }
}

impl SnapshotStore {
    /// Creates a store. An interval of zero disables periodic milestones.
    pub fn new(milestone_interval: u64) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            milestone_interval,
        }
    }

    pub fn milestone_interval(&self) -> u64 {
        self.milestone_interval
    }

    fn is_periodic_milestone(&self, sequence: Sequence) -> bool {
        self.milestone_interval > 0
            && sequence.as_u64() % self.milestone_interval == self.milestone_interval - 1
    }

    /// Stores a snapshot according to its retention.
    pub fn put(&self, snapshot: Snapshot) -> Result<()> {
        let mut streams = self.streams.write().map_err(|_| StorageError::poisoned())?;
        let entry = streams.entry(snapshot.stream.clone()).or_default();

        tracing::debug!(
            stream = %snapshot.stream,
            sequence = %snapshot.sequence,
            retention = ?snapshot.retention,
            "put snapshot"
        );

        match snapshot.retention {
            Retention::Transient => {
                entry.current = Some(snapshot);
            }
            Retention::Default => {
                if self.is_periodic_milestone(snapshot.sequence) {
                    entry
                        .milestones
                        .entry(snapshot.sequence)
                        .or_insert_with(|| snapshot.clone());
                }
                entry.current = Some(snapshot);
            }
            Retention::Persist => {
                if entry.current.is_none() {
                    entry.current = Some(snapshot.clone());
                }
                entry
                    .milestones
                    .entry(snapshot.sequence)
                    .or_insert(snapshot);
            }
        }
        Ok(())
    }

    /// Returns the current snapshot, falling back to the newest milestone.
    pub fn get(&self, stream: &StreamKey) -> Result<Option<Snapshot>> {
        let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
        Ok(streams.get(stream).and_then(|s| {
            s.current
                .clone()
                .or_else(|| s.milestones.values().next_back().cloned())
        }))
    }

    /// Returns the milestone at exactly `sequence`.
    pub fn get_at(&self, stream: &StreamKey, sequence: Sequence) -> Result<Option<Snapshot>> {
        let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
        Ok(streams
            .get(stream)
            .and_then(|s| s.milestones.get(&sequence).cloned()))
    }

    /// Lists milestones in ascending sequence order.
    pub fn milestones(&self, stream: &StreamKey) -> Result<Vec<Snapshot>> {
        let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
        Ok(streams
            .get(stream)
            .map(|s| s.milestones.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Removes every snapshot of `stream`. Idempotent.
    pub fn delete(&self, stream: &StreamKey) -> Result<bool> {
        let mut streams = self.streams.write().map_err(|_| StorageError::poisoned())?;
        Ok(streams.remove(stream).is_some())
    }

    /// Removes every snapshot inside `partition`; returns how many streams lost theirs.
    pub fn purge(&self, partition: &Partition) -> Result<usize> {
        let mut streams = self.streams.write().map_err(|_| StorageError::poisoned())?;
        let before = streams.len();
        streams.retain(|key, _| !partition.contains(key));
        Ok(before - streams.len())
    }

    /// Content hashes referenced by stored snapshot states.
    pub fn referenced_hashes(&self) -> Result<HashSet<ContentHash>> {
        let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
        let mut hashes = HashSet::new();
        for s in streams.values() {
            for snapshot in s.current.iter().chain(s.milestones.values()) {
                if let Payload::External(reference) = &snapshot.state {
                    hashes.insert(reference.content_hash);
                }
            }
        }
        Ok(hashes)
    }
}
