//! Append-only event log with optimistic concurrency.
//!
//! The [`EventLog`] is the system of record. It holds one gap-free stream
//! of [`EventRecord`]s per `(domain, edition, root)` and a secondary index
//! from correlation id to the streams that carry it.
//!
//! # Concurrency
//!
//! ```text
//! streams: RwLock<HashMap<StreamKey, Arc<RwLock<Stream>>>>
//!              |                          |
//!              |  read: every append      |  write: one append at a time
//!              |  write: new stream,      |  per stream (the CAS on
//!              |         edition delete   |  next_sequence)
//! ```
//!
//! An append holds the map read lock and its own stream's write lock, so
//! appends to different streams never contend. Edition deletion takes the
//! map write lock and therefore waits for in-flight appends to finish. The
//! correlation index is updated while the stream lock is still held: once
//! `append` returns, every later correlation lookup sees the new records.
//!
//! # Invariants
//!
//! - Sequences in a stream are `0, 1, 2, ...` with no gaps
//! - A batch is committed entirely or not at all
//! - `created_at` is strictly increasing within a stream

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tessera_types::{
    ContentHash, Cover, Edition, EventBook, EventRecord, NewEvent, Payload, Sequence, StreamKey,
    Timestamp,
};
use uuid::Uuid;

use crate::{Clock, EditionIndex, Result, StorageError, SystemClock};

#[derive(Debug, Default)]
struct Stream {
    records: Vec<EventRecord>,
}

impl Stream {
    fn next_sequence(&self) -> Sequence {
        Sequence::new(self.records.len() as u64)
    }

    fn last_created(&self) -> Option<Timestamp> {
        self.records.last().map(|r| r.created_at)
    }
}

type StreamCell = Arc<RwLock<Stream>>;

/// Append-only, sequence-numbered record store.
#[derive(Debug)]
pub struct EventLog {
    streams: RwLock<HashMap<StreamKey, StreamCell>>,
    correlations: RwLock<HashMap<String, BTreeSet<StreamKey>>>,
    clock: Arc<dyn Clock>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Creates an empty log stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            correlations: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn stream(&self, key: &StreamKey) -> Result<Option<StreamCell>> {
        let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
        Ok(streams.get(key).cloned())
    }

    /// Appends `events` to the stream addressed by `cover`.
    ///
    /// Succeeds only if `expected` equals the stream's next sequence; the
    /// committed records get sequences `expected..expected + len`. On
    /// conflict the stream is left untouched and the caller must re-read
    /// and retry.
    pub fn append(
        &self,
        cover: &Cover,
        expected: Sequence,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>> {
        if cover.domain.is_empty() {
            return Err(StorageError::InvalidArgument(
                "domain must not be empty".to_string(),
            ));
        }
        let key = cover.stream_key();

        {
            let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
            if let Some(cell) = streams.get(&key) {
                let mut stream = cell.write().map_err(|_| StorageError::poisoned())?;
                return self.commit(&key, cover, &mut stream, expected, events);
            }
        }

        // First append to this stream. Re-check under the map write lock in
        // case another writer created it in between.
        let mut streams = self.streams.write().map_err(|_| StorageError::poisoned())?;
        let cell = streams.entry(key.clone()).or_default().clone();
        let mut stream = cell.write().map_err(|_| StorageError::poisoned())?;
        let committed = self.commit(&key, cover, &mut stream, expected, events);
        if stream.records.is_empty() {
            // Failed or empty first append: leave no trace of the stream.
            drop(stream);
            streams.remove(&key);
        }
        committed
    }

    fn commit(
        &self,
        key: &StreamKey,
        cover: &Cover,
        stream: &mut Stream,
        expected: Sequence,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>> {
        let actual = stream.next_sequence();
        if expected != actual {
            tracing::warn!(
                stream = %key,
                expected = %expected,
                actual = %actual,
                "sequence conflict"
            );
            return Err(StorageError::SequenceConflict {
                stream: key.clone(),
                expected,
                actual,
            });
        }
        if events.is_empty() {
            return Ok(Vec::new());
        }

        // Build the whole batch before touching the stream so that nothing
        // below can fail halfway through.
        // The sequence after the batch must stay representable; it becomes
        // the stream's next expected sequence.
        let end = actual
            .as_u64()
            .checked_add(events.len() as u64)
            .ok_or_else(|| {
                StorageError::InvalidArgument(format!("stream {key} sequence overflow"))
            })?;

        let now = self.clock.now();
        let mut last = stream.last_created();
        let mut batch = Vec::with_capacity(events.len());
        for (event, sequence) in events.into_iter().zip(actual.as_u64()..end) {
            let created_at = Timestamp::monotonic_after(now, last);
            batch.push(EventRecord {
                sequence: Sequence::new(sequence),
                event_type: event.event_type,
                payload: event.payload,
                created_at,
                correlation_id: cover.correlation_id.clone(),
            });
            last = Some(created_at);
        }

        if !cover.correlation_id.is_empty() {
            let mut correlations = self
                .correlations
                .write()
                .map_err(|_| StorageError::poisoned())?;
            correlations
                .entry(cover.correlation_id.clone())
                .or_default()
                .insert(key.clone());
        }

        let base = stream.records.len();
        stream.records.extend(batch);
        let committed = stream.records[base..].to_vec();

        // Postcondition: sequences are dense and end at the new next_sequence
        debug_assert_eq!(stream.next_sequence(), Sequence::new(end));
        debug_assert!(
            committed
                .iter()
                .zip(expected.as_u64()..)
                .all(|(r, s)| r.sequence.as_u64() == s)
        );

        tracing::info!(
            stream = %key,
            from = %expected,
            count = committed.len(),
            correlation_id = %cover.correlation_id,
            "committed records"
        );
        Ok(committed)
    }

    /// Returns the next sequence to append at; zero for unknown streams.
    pub fn next_sequence(&self, cover: &Cover) -> Result<Sequence> {
        match self.stream(&cover.stream_key())? {
            Some(cell) => {
                let stream = cell.read().map_err(|_| StorageError::poisoned())?;
                Ok(stream.next_sequence())
            }
            None => Ok(Sequence::ZERO),
        }
    }

    /// Reads `stream[lower..=upper]` (or to the end when `upper` is `None`).
    ///
    /// Bounds past the end of the stream yield an empty result, not an error.
    pub fn get_range(
        &self,
        cover: &Cover,
        lower: Sequence,
        upper: Option<Sequence>,
    ) -> Result<Vec<EventRecord>> {
        self.read_with(cover, |records| {
            let len = records.len();
            let start = lower.as_usize().min(len);
            let end = upper.map_or(len, |u| u.as_usize().saturating_add(1).min(len));
            if start >= end {
                return Vec::new();
            }
            records[start..end].to_vec()
        })
    }

    /// Reads everything from `from` to the end of the stream.
    pub fn get_from(&self, cover: &Cover, from: Sequence) -> Result<Vec<EventRecord>> {
        self.get_range(cover, from, None)
    }

    /// Reads the prefix ending at `sequence` (inclusive).
    pub fn get_as_of_sequence(
        &self,
        cover: &Cover,
        sequence: Sequence,
    ) -> Result<Vec<EventRecord>> {
        self.get_range(cover, Sequence::ZERO, Some(sequence))
    }

    /// Reads every record created at or before `at`.
    pub fn get_as_of_time(&self, cover: &Cover, at: Timestamp) -> Result<Vec<EventRecord>> {
        self.read_with(cover, |records| {
            // created_at is strictly increasing, so the matches form a prefix
            let end = records.partition_point(|r| r.created_at <= at);
            records[..end].to_vec()
        })
    }

    fn read_with<F>(&self, cover: &Cover, f: F) -> Result<Vec<EventRecord>>
    where
        F: FnOnce(&[EventRecord]) -> Vec<EventRecord>,
    {
        let Some(cell) = self.stream(&cover.stream_key())? else {
            return Ok(Vec::new());
        };
        let stream = cell.read().map_err(|_| StorageError::poisoned())?;
        Ok(f(&stream.records))
    }

    /// Returns, per stream, the records tagged with `correlation_id`.
    ///
    /// Books are ordered by stream key; unknown ids yield an empty result.
    pub fn get_by_correlation(&self, correlation_id: &str) -> Result<Vec<EventBook>> {
        if correlation_id.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<StreamKey> = {
            let correlations = self
                .correlations
                .read()
                .map_err(|_| StorageError::poisoned())?;
            match correlations.get(correlation_id) {
                Some(keys) => keys.iter().cloned().collect(),
                None => return Ok(Vec::new()),
            }
        };

        let mut books = Vec::with_capacity(keys.len());
        for key in keys {
            // Deleted concurrently with the lookup.
            let Some(cell) = self.stream(&key)? else {
                continue;
            };
            let stream = cell.read().map_err(|_| StorageError::poisoned())?;
            let records: Vec<EventRecord> = stream
                .records
                .iter()
                .filter(|r| r.correlation_id == correlation_id)
                .cloned()
                .collect();
            if records.is_empty() {
                continue;
            }
            books.push(EventBook {
                cover: Cover::from_stream(&key, correlation_id),
                snapshot: None,
                records,
                next_sequence: stream.next_sequence(),
            });
        }

        tracing::debug!(
            correlation_id,
            streams = books.len(),
            "correlation lookup"
        );
        Ok(books)
    }

    /// Lists the roots of `domain` that have records in `edition`, sorted.
    pub fn list_roots(&self, domain: &str, edition: &Edition) -> Result<Vec<Uuid>> {
        let partition = EditionIndex::partition(domain, edition);
        let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
        let mut roots: Vec<Uuid> = streams
            .keys()
            .filter(|key| partition.contains(key))
            .map(|key| key.root)
            .collect();
        roots.sort_unstable();
        Ok(roots)
    }

    /// Lists every domain with at least one stream in any edition, sorted.
    pub fn list_domains(&self) -> Result<Vec<String>> {
        let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
        let domains: BTreeSet<&str> = streams.keys().map(|k| k.domain.as_str()).collect();
        Ok(domains.into_iter().map(str::to_string).collect())
    }

    /// Hard-deletes every stream of `domain` in `edition`.
    ///
    /// Returns the number of streams removed. The main timeline is rejected
    /// unconditionally.
    pub fn delete_edition(&self, domain: &str, edition: &Edition) -> Result<usize> {
        EditionIndex::ensure_deletable(edition)?;
        let partition = EditionIndex::partition(domain, edition);

        let mut streams = self.streams.write().map_err(|_| StorageError::poisoned())?;
        let doomed: Vec<StreamKey> = streams
            .keys()
            .filter(|key| partition.contains(key))
            .cloned()
            .collect();
        for key in &doomed {
            streams.remove(key);
        }

        let mut correlations = self
            .correlations
            .write()
            .map_err(|_| StorageError::poisoned())?;
        correlations.retain(|_, keys| {
            keys.retain(|key| !partition.contains(key));
            !keys.is_empty()
        });

        tracing::info!(
            domain,
            edition = %edition,
            streams = doomed.len(),
            "deleted edition"
        );
        Ok(doomed.len())
    }

    /// Content hashes referenced by any committed record.
    pub fn referenced_hashes(&self) -> Result<HashSet<ContentHash>> {
        let cells: Vec<StreamCell> = {
            let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
            streams.values().cloned().collect()
        };

        let mut hashes = HashSet::new();
        for cell in cells {
            let stream = cell.read().map_err(|_| StorageError::poisoned())?;
            hashes.extend(stream.records.iter().filter_map(|r| match &r.payload {
                Payload::External(reference) => Some(reference.content_hash),
                Payload::Inline(_) => None,
            }));
        }
        Ok(hashes)
    }

    /// Number of streams with at least one record.
    pub fn stream_count(&self) -> Result<usize> {
        let streams = self.streams.read().map_err(|_| StorageError::poisoned())?;
        Ok(streams.len())
    }
}
