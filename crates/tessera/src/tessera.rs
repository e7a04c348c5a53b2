//! Main entry point for the Tessera core.
//!
//! The `Tessera` struct wires the storage components together and exposes
//! the logical operation surface: appends, event-book reads, snapshots,
//! positions, edition deletion, payload reclaim and notifications.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tessera_config::{PayloadBackend, TesseraConfig};
use tessera_storage::{
    BlobBackend, Clock, DEFAULT_MILESTONE_INTERVAL, DEFAULT_OFFLOAD_THRESHOLD, EditionIndex,
    ErrorKind, EventLog, FsBlobs, MemoryBlobs, PayloadStore, PositionStore, SnapshotStore,
    StorageError, SweepReport, SystemClock, Upcaster,
};
use tessera_types::{
    Cover, EventBook, EventRecord, NewEvent, Payload, Position, PositionKey, Retention, Sequence,
    Snapshot, Uuid,
};

use crate::collab::{
    DeadLetter, DeadLetterPayload, DeadLetterReason, DeadLetterSink, EventBus, NoOpBus,
    NoOpDeadLetters, NoOpNotifications, Notification, NotificationChannel,
};
use crate::error::{Result, TesseraError};
use crate::selector::{AsOf, Selector};

/// Builder for [`Tessera`].
#[derive(Debug)]
pub struct TesseraBuilder {
    clock: Arc<dyn Clock>,
    blobs: Arc<dyn BlobBackend>,
    threshold: usize,
    milestone_interval: u64,
    upcaster: Upcaster,
    bus: Arc<dyn EventBus>,
    dead_letters: Arc<dyn DeadLetterSink>,
    notifications: Arc<dyn NotificationChannel>,
}

impl Default for TesseraBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            blobs: Arc::new(MemoryBlobs::new()),
            threshold: DEFAULT_OFFLOAD_THRESHOLD,
            milestone_interval: DEFAULT_MILESTONE_INTERVAL,
            upcaster: Upcaster::empty(),
            bus: Arc::new(NoOpBus),
            dead_letters: Arc::new(NoOpDeadLetters),
            notifications: Arc::new(NoOpNotifications),
        }
    }
}

impl TesseraBuilder {
    /// Starts from a loaded configuration, opening the configured blob backend.
    pub fn from_config(config: &TesseraConfig) -> Result<Self> {
        let blobs: Arc<dyn BlobBackend> = match config.payloads.backend {
            PayloadBackend::Memory => Arc::new(MemoryBlobs::new()),
            PayloadBackend::Filesystem => {
                let fs = FsBlobs::open(&config.payloads.directory).map_err(|e| {
                    TesseraError::Config(format!(
                        "cannot open payload directory {}: {e}",
                        config.payloads.directory.display()
                    ))
                })?;
                Arc::new(fs)
            }
        };

        Ok(Self {
            blobs,
            threshold: config.payloads.threshold_bytes,
            milestone_interval: config.snapshots.milestone_interval,
            ..Self::default()
        })
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn blob_backend(mut self, blobs: Arc<dyn BlobBackend>) -> Self {
        self.blobs = blobs;
        self
    }

    /// Payloads strictly larger than `threshold` bytes are offloaded.
    pub fn offload_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn milestone_interval(mut self, interval: u64) -> Self {
        self.milestone_interval = interval;
        self
    }

    pub fn upcaster(mut self, upcaster: Upcaster) -> Self {
        self.upcaster = upcaster;
        self
    }

    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = sink;
        self
    }

    pub fn notifications(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.notifications = channel;
        self
    }

    pub fn build(self) -> Tessera {
        let inner = TesseraInner {
            log: EventLog::with_clock(self.clock.clone()),
            snapshots: SnapshotStore::new(self.milestone_interval),
            positions: PositionStore::new(),
            payloads: PayloadStore::new(self.blobs, self.threshold, self.clock.clone()),
            upcaster: self.upcaster,
            bus: self.bus,
            dead_letters: self.dead_letters,
            notifications: self.notifications,
            clock: self.clock,
        };
        Tessera {
            inner: Arc::new(inner),
        }
    }
}

#[derive(Debug)]
struct TesseraInner {
    log: EventLog,
    snapshots: SnapshotStore,
    positions: PositionStore,
    payloads: PayloadStore,
    upcaster: Upcaster,
    bus: Arc<dyn EventBus>,
    dead_letters: Arc<dyn DeadLetterSink>,
    notifications: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
}

/// The event-sourcing core.
///
/// Cheap to clone; clones share the same stores.
///
/// # Example
///
/// ```
/// use tessera::{Cover, NewEvent, Selector, Sequence, Tessera};
///
/// let tessera = Tessera::builder().build();
/// let cover = Cover::new("player", tessera::Uuid::new_v4());
///
/// tessera.append(&cover, Sequence::ZERO, vec![NewEvent::new("Registered", "alice")])?;
/// let book = tessera.get_event_book(&cover, &Selector::Latest)?;
/// assert_eq!(book.next_sequence, Sequence::new(1));
/// # Ok::<(), tessera::TesseraError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Tessera {
    inner: Arc<TesseraInner>,
}

impl Tessera {
    pub fn builder() -> TesseraBuilder {
        TesseraBuilder::default()
    }

    /// Builds an instance from configuration with no-op collaborators.
    pub fn from_config(config: &TesseraConfig) -> Result<Self> {
        Ok(TesseraBuilder::from_config(config)?.build())
    }

    pub fn payloads(&self) -> &PayloadStore {
        &self.inner.payloads
    }

    // ------------------------------------------------------------------------
    // Event log
    // ------------------------------------------------------------------------

    /// Appends `events` at `expected`, offloading oversized payloads first.
    ///
    /// On success the committed batch is published to the event bus. A
    /// sequence conflict is dead-lettered and returned; nothing is retried.
    pub fn append(
        &self,
        cover: &Cover,
        expected: Sequence,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>> {
        require_domain(&cover.domain)?;

        let mut prepared = Vec::with_capacity(events.len());
        for event in &events {
            prepared.push(NewEvent {
                event_type: event.event_type.clone(),
                payload: self.inner.payloads.externalize(event.payload.clone())?,
            });
        }

        let committed = match self.inner.log.append(cover, expected, prepared) {
            Ok(committed) => committed,
            Err(e) => {
                if e.kind() == ErrorKind::SequenceConflict {
                    self.dead_letter(
                        cover,
                        DeadLetterReason::SequenceConflict,
                        "append",
                        &e,
                        DeadLetterPayload::Events(events),
                    );
                }
                return Err(e.into());
            }
        };

        if !committed.is_empty() {
            let book = EventBook {
                cover: cover.clone(),
                snapshot: None,
                next_sequence: expected + Sequence::new(committed.len() as u64),
                records: committed.clone(),
            };
            if let Err(e) = self.inner.bus.publish(&book) {
                // The batch is durable; subscribers catch up from their positions.
                tracing::warn!(
                    domain = %cover.domain,
                    root = %cover.root,
                    error = %e,
                    "event bus publish failed"
                );
            }
        }
        Ok(committed)
    }

    /// Returns the next sequence to append at for `cover`.
    pub fn next_sequence(&self, cover: &Cover) -> Result<Sequence> {
        require_domain(&cover.domain)?;
        Ok(self.inner.log.next_sequence(cover)?)
    }

    /// Reads one stream's event book.
    ///
    /// Payloads are resolved and upcast. Only [`Selector::Latest`] attaches
    /// a snapshot, and only one still below the stream's next sequence.
    pub fn get_event_book(&self, cover: &Cover, selector: &Selector) -> Result<EventBook> {
        require_domain(&cover.domain)?;
        selector.validate()?;

        let log = &self.inner.log;
        let next_sequence = log.next_sequence(cover)?;
        let mut snapshot = None;

        let records = match selector {
            Selector::Latest => {
                let usable = self
                    .inner
                    .snapshots
                    .get(&cover.stream_key())?
                    .filter(|s| s.sequence < next_sequence);
                match usable {
                    Some(s) => {
                        let from = s.sequence + Sequence::new(1);
                        snapshot = Some(self.resolve_snapshot(cover, s)?);
                        log.get_from(cover, from)?
                    }
                    None => log.get_from(cover, Sequence::ZERO)?,
                }
            }
            Selector::Range { lower, upper } => log.get_range(cover, *lower, *upper)?,
            Selector::Temporal(point) => match point.resolve()? {
                AsOf::Sequence(s) => log.get_as_of_sequence(cover, s)?,
                AsOf::Timestamp(t) => log.get_as_of_time(cover, t)?,
            },
            Selector::Correlation(id) => log
                .get_from(cover, Sequence::ZERO)?
                .into_iter()
                .filter(|r| &r.correlation_id == id)
                .collect(),
        };

        let records = self.load(cover, records)?;
        tracing::debug!(
            domain = %cover.domain,
            root = %cover.root,
            edition = %cover.edition,
            count = records.len(),
            snapshot = snapshot.is_some(),
            "read event book"
        );

        Ok(EventBook {
            cover: cover.clone(),
            snapshot,
            records,
            next_sequence,
        })
    }

    /// Returns, per stream, the records appended under `correlation_id`.
    pub fn get_correlated(&self, correlation_id: &str) -> Result<Vec<EventBook>> {
        if correlation_id.is_empty() {
            return Err(TesseraError::invalid("correlation id must not be empty"));
        }
        let mut books = self.inner.log.get_by_correlation(correlation_id)?;
        for book in &mut books {
            let records = std::mem::take(&mut book.records);
            book.records = self.load(&book.cover, records)?;
        }
        Ok(books)
    }

    pub fn list_roots(&self, domain: &str, edition: &str) -> Result<Vec<Uuid>> {
        require_domain(domain)?;
        Ok(self
            .inner
            .log
            .list_roots(domain, &EditionIndex::resolve(edition))?)
    }

    pub fn list_domains(&self) -> Result<Vec<String>> {
        Ok(self.inner.log.list_domains()?)
    }

    /// Number of streams holding at least one record, across all editions.
    pub fn stream_count(&self) -> Result<usize> {
        Ok(self.inner.log.stream_count()?)
    }

    /// Hard-deletes a non-main edition of `domain`, snapshots included.
    ///
    /// Positions are consumer-owned and left in place.
    pub fn delete_edition(&self, domain: &str, edition: &str) -> Result<usize> {
        require_domain(domain)?;
        let edition = EditionIndex::resolve(edition);
        let streams = self.inner.log.delete_edition(domain, &edition)?;
        let snapshots = self
            .inner
            .snapshots
            .purge(&EditionIndex::partition(domain, &edition))?;
        tracing::info!(domain, edition = %edition, streams, snapshots, "edition removed");
        Ok(streams)
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Stores the state reached after applying the record at `sequence`.
    ///
    /// `sequence` must refer to a committed record.
    pub fn put_snapshot(
        &self,
        cover: &Cover,
        sequence: Sequence,
        state: Bytes,
        retention: Retention,
    ) -> Result<()> {
        require_domain(&cover.domain)?;
        let next = self.inner.log.next_sequence(cover)?;
        if sequence >= next {
            return Err(TesseraError::invalid(format!(
                "snapshot at {sequence} is not below next sequence {next}"
            )));
        }
        let state = self.inner.payloads.externalize(Payload::Inline(state))?;
        self.inner.snapshots.put(Snapshot {
            stream: cover.stream_key(),
            sequence,
            state,
            retention,
        })?;
        Ok(())
    }

    /// Returns the current snapshot, or the newest milestone, with state resolved.
    pub fn get_snapshot(&self, cover: &Cover) -> Result<Option<Snapshot>> {
        require_domain(&cover.domain)?;
        self.inner
            .snapshots
            .get(&cover.stream_key())?
            .map(|s| self.resolve_snapshot(cover, s))
            .transpose()
    }

    /// Returns the milestone at exactly `sequence`.
    pub fn get_snapshot_at(&self, cover: &Cover, sequence: Sequence) -> Result<Option<Snapshot>> {
        require_domain(&cover.domain)?;
        self.inner
            .snapshots
            .get_at(&cover.stream_key(), sequence)?
            .map(|s| self.resolve_snapshot(cover, s))
            .transpose()
    }

    /// Sequences of the milestones kept for `cover`, ascending.
    pub fn snapshot_milestones(&self, cover: &Cover) -> Result<Vec<Sequence>> {
        require_domain(&cover.domain)?;
        Ok(self
            .inner
            .snapshots
            .milestones(&cover.stream_key())?
            .into_iter()
            .map(|s| s.sequence)
            .collect())
    }

    /// Removes all snapshots of `cover`. Idempotent.
    pub fn delete_snapshot(&self, cover: &Cover) -> Result<()> {
        require_domain(&cover.domain)?;
        self.inner.snapshots.delete(&cover.stream_key())?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Positions
    // ------------------------------------------------------------------------

    pub fn get_position(&self, key: &PositionKey) -> Result<Option<Sequence>> {
        Ok(self.inner.positions.get(key)?)
    }

    pub fn put_position(&self, key: PositionKey, sequence: Sequence) -> Result<()> {
        Ok(self.inner.positions.put(key, sequence)?)
    }

    /// Every checkpoint `handler_id` holds, across domains and roots.
    pub fn positions_for(&self, handler_id: &str) -> Result<Vec<Position>> {
        if handler_id.is_empty() {
            return Err(TesseraError::invalid("handler id must not be empty"));
        }
        Ok(self.inner.positions.positions_for(handler_id)?)
    }

    // ------------------------------------------------------------------------
    // Payloads and notifications
    // ------------------------------------------------------------------------

    /// Marks every hash reachable from the log and snapshots, then sweeps
    /// unreferenced blobs untouched for longer than `max_age`.
    pub fn sweep_payloads(&self, max_age: Duration) -> Result<SweepReport> {
        let mut live: HashSet<_> = self.inner.log.referenced_hashes()?;
        live.extend(self.inner.snapshots.referenced_hashes()?);
        Ok(self.inner.payloads.sweep(max_age, &live)?)
    }

    /// Routes an ephemeral message by cover. Never written to the log.
    pub fn notify(&self, cover: &Cover, payload: Bytes) -> Result<()> {
        require_domain(&cover.domain)?;
        self.inner.notifications.notify(Notification {
            cover: cover.clone(),
            payload,
            sent_at: self.inner.clock.now(),
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Resolves offloaded payloads, then upcasts.
    fn load(&self, cover: &Cover, records: Vec<EventRecord>) -> Result<Vec<EventRecord>> {
        let mut resolved = Vec::with_capacity(records.len());
        for record in &records {
            match self.inner.payloads.resolve_payload(&record.payload) {
                Ok(bytes) => resolved.push(EventRecord {
                    payload: Payload::Inline(bytes),
                    ..record.clone()
                }),
                Err(e) => {
                    self.dead_letter(
                        cover,
                        DeadLetterReason::PayloadRetrieval,
                        "event-book",
                        &e,
                        DeadLetterPayload::Records(records.clone()),
                    );
                    return Err(e.into());
                }
            }
        }

        self.inner.upcaster.upcast(resolved).map_err(|e| {
            self.dead_letter(
                cover,
                DeadLetterReason::TransformFailed,
                "upcaster",
                &e,
                DeadLetterPayload::Records(records),
            );
            e.into()
        })
    }

    fn resolve_snapshot(&self, cover: &Cover, mut snapshot: Snapshot) -> Result<Snapshot> {
        if let Payload::External(_) = &snapshot.state {
            match self.inner.payloads.resolve_payload(&snapshot.state) {
                Ok(bytes) => snapshot.state = Payload::Inline(bytes),
                Err(e) => {
                    self.dead_letter(
                        cover,
                        DeadLetterReason::PayloadRetrieval,
                        "snapshot",
                        &e,
                        DeadLetterPayload::Records(Vec::new()),
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(snapshot)
    }

    fn dead_letter(
        &self,
        cover: &Cover,
        reason: DeadLetterReason,
        source: &str,
        error: &StorageError,
        payload: DeadLetterPayload,
    ) {
        tracing::warn!(
            domain = %cover.domain,
            root = %cover.root,
            correlation_id = %cover.correlation_id,
            reason = %reason,
            source,
            error = %error,
            "dead-lettering"
        );
        let letter = DeadLetter {
            cover: cover.clone(),
            reason,
            source: source.to_string(),
            detail: error.to_string(),
            payload,
        };
        if let Err(e) = self.inner.dead_letters.send(letter) {
            tracing::warn!(error = %e, "dead-letter sink refused letter");
        }
    }
}

fn require_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(TesseraError::invalid("domain must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{RecordingBus, RecordingDeadLetters, RecordingNotifications};
    use tessera_storage::ManualClock;
    use tessera_types::Timestamp;

    fn cover() -> Cover {
        Cover::new("player", Uuid::from_u128(1))
    }

    #[test]
    fn empty_domain_is_rejected_everywhere() {
        let tessera = Tessera::builder().build();
        let blank = Cover::new("", Uuid::nil());

        let kinds = [
            tessera
                .append(&blank, Sequence::ZERO, Vec::new())
                .unwrap_err()
                .kind(),
            tessera
                .get_event_book(&blank, &Selector::Latest)
                .unwrap_err()
                .kind(),
            tessera.list_roots("", "").unwrap_err().kind(),
            tessera.delete_edition("", "temp").unwrap_err().kind(),
            tessera
                .notify(&blank, Bytes::from_static(b"x"))
                .unwrap_err()
                .kind(),
        ];
        assert!(kinds.iter().all(|k| *k == ErrorKind::InvalidArgument));
    }

    #[test]
    fn append_publishes_committed_batch() {
        let bus = Arc::new(RecordingBus::new());
        let tessera = Tessera::builder().event_bus(bus.clone()).build();

        tessera
            .append(&cover(), Sequence::ZERO, vec![NewEvent::new("A", "a")])
            .unwrap();
        tessera
            .append(&cover(), Sequence::new(1), Vec::new())
            .unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].next_sequence, Sequence::new(1));
        assert_eq!(published[0].records[0].event_type, "A");
    }

    #[test]
    fn conflict_is_dead_lettered_and_returned() {
        let sink = Arc::new(RecordingDeadLetters::new());
        let bus = Arc::new(RecordingBus::new());
        let tessera = Tessera::builder()
            .dead_letters(sink.clone())
            .event_bus(bus.clone())
            .build();
        let cover = cover().with_correlation("flow-1");

        tessera
            .append(&cover, Sequence::ZERO, vec![NewEvent::new("A", "a")])
            .unwrap();
        let err = tessera
            .append(&cover, Sequence::ZERO, vec![NewEvent::new("B", "b")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SequenceConflict);

        let letters = sink.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, DeadLetterReason::SequenceConflict);
        assert_eq!(letters[0].source, "append");
        assert_eq!(letters[0].cover.correlation_id, "flow-1");
        assert_eq!(
            letters[0].payload,
            DeadLetterPayload::Events(vec![NewEvent::new("B", "b")])
        );
        assert_eq!(bus.published().len(), 1);
    }

    #[test]
    fn notifications_are_never_sequenced() {
        let channel = Arc::new(RecordingNotifications::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(5)));
        let tessera = Tessera::builder()
            .notifications(channel.clone())
            .clock(clock)
            .build();

        tessera
            .notify(&cover(), Bytes::from_static(b"compensate"))
            .unwrap();

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sent_at, Timestamp::from_secs(5));
        assert_eq!(tessera.next_sequence(&cover()).unwrap(), Sequence::ZERO);
        assert!(tessera.list_domains().unwrap().is_empty());
    }

    #[test]
    fn snapshot_must_be_behind_head() {
        let tessera = Tessera::builder().build();
        let err = tessera
            .put_snapshot(&cover(), Sequence::ZERO, Bytes::new(), Retention::Default)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        tessera
            .append(&cover(), Sequence::ZERO, vec![NewEvent::new("A", "a")])
            .unwrap();
        tessera
            .put_snapshot(&cover(), Sequence::ZERO, Bytes::new(), Retention::Default)
            .unwrap();
        assert!(tessera.get_snapshot(&cover()).unwrap().is_some());
    }

    #[test]
    fn large_snapshot_state_is_offloaded_and_resolved() {
        let tessera = Tessera::builder().offload_threshold(8).build();
        tessera
            .append(&cover(), Sequence::ZERO, vec![NewEvent::new("A", "a")])
            .unwrap();

        let state = Bytes::from(vec![9u8; 64]);
        tessera
            .put_snapshot(&cover(), Sequence::ZERO, state.clone(), Retention::Default)
            .unwrap();

        assert_eq!(tessera.payloads().stats().unwrap().blobs, 1);
        let snapshot = tessera.get_snapshot(&cover()).unwrap().unwrap();
        assert_eq!(snapshot.state, Payload::Inline(state));
    }
}
