//! # tessera-types: Core types for `Tessera`
//!
//! This crate contains shared types used across the `Tessera` system:
//! - Positions within a stream ([`Sequence`])
//! - Temporal types ([`Timestamp`])
//! - Content addressing ([`ContentHash`], [`PayloadReference`], [`StorageType`])
//! - Stream addressing ([`Edition`], [`Cover`], [`StreamKey`])
//! - Log records ([`NewEvent`], [`EventRecord`], [`Payload`], [`EventBook`])
//! - Snapshots ([`Snapshot`], [`Retention`])
//! - Consumer checkpoints ([`PositionKey`], [`Position`])

use std::{
    fmt::{Debug, Display},
    ops::{Add, AddAssign},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
pub use uuid::Uuid;

// ============================================================================
// Sequence - Copy (8-byte position in a stream)
// ============================================================================

/// Position of a record within its stream.
///
/// Sequences are zero-indexed and gap-free. The first record in a stream
/// has sequence 0, the second has sequence 1, and so on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Sequence(u64);

impl Sequence {
    pub const ZERO: Sequence = Sequence(0);

    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    /// Returns the sequence as a `u64`.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the sequence as a `usize` for indexing.
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Returns the following sequence, or `None` on overflow.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Sequence {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Sequence {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Sequence> for u64 {
    fn from(sequence: Sequence) -> Self {
        sequence.0
    }
}

// ============================================================================
// Timestamp - Copy (8-byte value with monotonic guarantee)
// ============================================================================

/// Wall-clock timestamp with monotonic guarantee within a stream.
///
/// Stored as nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from nanoseconds since Unix epoch.
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from whole seconds since Unix epoch.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the timestamp as nanoseconds since Unix epoch.
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp as seconds since Unix epoch (truncates nanoseconds).
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Creates a timestamp for the current time.
    ///
    /// A system clock set before the Unix epoch reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Converts a wall-clock reading, clamping to the representable range.
    pub fn from_system_time(time: SystemTime) -> Self {
        let nanos = time
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        Self(nanos)
    }

    /// Returns `max(now, last + 1ns)`.
    ///
    /// Each timestamp is strictly greater than the previous, even if the
    /// system clock moves backwards or two records land in the same nanosecond.
    pub fn monotonic_after(now: Timestamp, last: Option<Timestamp>) -> Self {
        match last {
            Some(prev) if now.0 <= prev.0 => Timestamp(prev.0.saturating_add(1)),
            _ => now,
        }
    }

    /// Returns the elapsed time between `earlier` and `self`, saturating at zero.
    pub fn saturating_elapsed_since(&self, earlier: Timestamp) -> std::time::Duration {
        std::time::Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Returns this timestamp moved back by `duration`, saturating at the epoch.
    pub fn saturating_sub(&self, duration: std::time::Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(nanos))
    }

    /// Parses an RFC 3339 timestamp such as `2024-03-01T12:00:00Z`.
    pub fn parse_rfc3339(input: &str) -> Result<Self, TimestampParseError> {
        let parsed = chrono::DateTime::parse_from_rfc3339(input)
            .map_err(|e| TimestampParseError(format!("{input}: {e}")))?;
        let nanos = parsed
            .timestamp_nanos_opt()
            .ok_or_else(|| TimestampParseError(format!("{input}: out of range")))?;
        u64::try_from(nanos)
            .map(Self)
            .map_err(|_| TimestampParseError(format!("{input}: before Unix epoch")))
    }

    /// Formats the timestamp as RFC 3339 with nanosecond precision.
    pub fn to_rfc3339(&self) -> String {
        let secs = (self.0 / 1_000_000_000) as i64;
        let nanos = (self.0 % 1_000_000_000) as u32;
        chrono::DateTime::from_timestamp(secs, nanos)
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
            .unwrap_or_default()
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl From<u64> for Timestamp {
    fn from(nanos: u64) -> Self {
        Self(nanos)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

/// Error returned when a timestamp string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampParseError(String);

impl Display for TimestampParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid RFC 3339 timestamp {}", self.0)
    }
}

impl std::error::Error for TimestampParseError {}

// ============================================================================
// Content Hash - Copy (fixed 32-byte SHA-256 digest)
// ============================================================================

/// Length of content hashes in bytes (SHA-256).
pub const HASH_LENGTH: usize = 32;

/// A 32-byte SHA-256 digest identifying a blob by its content.
///
/// Two payloads with identical bytes always have the same hash, which is
/// what lets the payload store deduplicate them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; HASH_LENGTH]);

impl ContentHash {
    /// Creates a hash from raw bytes.
    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the hash as a byte slice.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Returns the lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != HASH_LENGTH * 2 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; HASH_LENGTH];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 bytes are plenty to tell blobs apart in logs
        write!(
            f,
            "ContentHash({:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}...)",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5], self.0[6], self.0[7]
        )
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; HASH_LENGTH]> for ContentHash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ============================================================================
// Editions and stream addressing
// ============================================================================

/// Reserved name of the main timeline.
pub const MAIN_EDITION: &str = "angzarr";

/// Reserved alias for the main timeline accepted from callers.
pub const MAIN_EDITION_ALIAS: &str = "<main>";

/// An isolated timeline namespace.
///
/// The empty string, [`MAIN_EDITION_ALIAS`] and [`MAIN_EDITION`] all name the
/// main timeline; the constructor folds them to the same canonical value so
/// that every key built from an `Edition` agrees on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Edition(String);

impl Edition {
    /// The main (production) timeline.
    pub fn main() -> Self {
        Self(MAIN_EDITION.to_string())
    }

    /// Creates an edition, resolving the main-timeline aliases.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() || name == MAIN_EDITION_ALIAS {
            Self::main()
        } else {
            Self(name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the main timeline.
    pub fn is_main(&self) -> bool {
        self.0 == MAIN_EDITION
    }
}

impl Default for Edition {
    fn default() -> Self {
        Self::main()
    }
}

impl Display for Edition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Edition {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Edition {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<Edition> for String {
    fn from(edition: Edition) -> Self {
        edition.0
    }
}

/// Identity of one stream: `(domain, edition, root)`.
///
/// The correlation id is deliberately absent; it tags records, it does not
/// partition them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub domain: String,
    pub edition: Edition,
    pub root: Uuid,
}

impl StreamKey {
    pub fn new(domain: impl Into<String>, edition: impl Into<Edition>, root: Uuid) -> Self {
        Self {
            domain: domain.into(),
            edition: edition.into(),
            root,
        }
    }
}

impl Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}/{}", self.edition, self.domain, self.root)
    }
}

/// The addressing tuple carried by every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cover {
    pub domain: String,
    pub root: Uuid,
    pub correlation_id: String,
    pub edition: Edition,
}

impl Cover {
    /// Creates a cover on the main timeline with no correlation id.
    pub fn new(domain: impl Into<String>, root: Uuid) -> Self {
        Self {
            domain: domain.into(),
            root,
            correlation_id: String::new(),
            edition: Edition::main(),
        }
    }

    pub fn with_edition(mut self, edition: impl Into<Edition>) -> Self {
        self.edition = edition.into();
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Returns the stream this cover addresses.
    pub fn stream_key(&self) -> StreamKey {
        StreamKey {
            domain: self.domain.clone(),
            edition: self.edition.clone(),
            root: self.root,
        }
    }

    /// Rebuilds a cover from a stream key and a correlation id.
    pub fn from_stream(key: &StreamKey, correlation_id: impl Into<String>) -> Self {
        Self {
            domain: key.domain.clone(),
            root: key.root,
            correlation_id: correlation_id.into(),
            edition: key.edition.clone(),
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Where an offloaded blob lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageType {
    Memory,
    Filesystem,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Memory => "memory",
            StorageType::Filesystem => "filesystem",
        }
    }
}

impl Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StorageType::Memory),
            "filesystem" => Ok(StorageType::Filesystem),
            other => Err(format!("unknown storage type '{other}'")),
        }
    }
}

/// Claim-check for a payload stored outside the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadReference {
    /// SHA-256 of the original bytes.
    pub content_hash: ContentHash,
    pub storage_type: StorageType,
    /// Backend-specific locator, e.g. `file:///var/blobs/ab/ab12...`.
    pub uri: String,
    /// Length of the original bytes.
    pub original_size: u64,
    /// When the blob was first written.
    pub stored_at: Timestamp,
}

/// A record or snapshot body: either the bytes themselves or a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payload {
    Inline(Bytes),
    External(PayloadReference),
}

impl Payload {
    /// Returns the inline bytes, if the payload is not offloaded.
    pub fn as_inline(&self) -> Option<&Bytes> {
        match self {
            Payload::Inline(bytes) => Some(bytes),
            Payload::External(_) => None,
        }
    }

    /// Returns the reference, if the payload is offloaded.
    pub fn as_reference(&self) -> Option<&PayloadReference> {
        match self {
            Payload::Inline(_) => None,
            Payload::External(reference) => Some(reference),
        }
    }

    /// Size of the logical payload, regardless of where it lives.
    pub fn len(&self) -> u64 {
        match self {
            Payload::Inline(bytes) => bytes.len() as u64,
            Payload::External(reference) => reference.original_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Inline(bytes)
    }
}

// ============================================================================
// Records
// ============================================================================

/// An event submitted for append, before it has a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: Payload,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: Payload::Inline(payload.into()),
        }
    }
}

/// A committed record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: Sequence,
    pub event_type: String,
    pub payload: Payload,
    pub created_at: Timestamp,
    /// Correlation id of the append that produced this record (may be empty).
    pub correlation_id: String,
}

/// Records for one stream, optionally preceded by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBook {
    pub cover: Cover,
    pub snapshot: Option<Snapshot>,
    pub records: Vec<EventRecord>,
    /// The stream's next sequence at the time the book was read.
    pub next_sequence: Sequence,
}

// ============================================================================
// Snapshots
// ============================================================================

/// How long a snapshot is kept once newer snapshots arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Retention {
    /// Replaced by the next put; kept as a milestone at fixed intervals.
    #[default]
    Default,
    /// Replaced by the next put; never kept.
    Transient,
    /// Kept as a milestone keyed by sequence; never overwritten.
    Persist,
}

/// A materialized aggregate state at a given sequence.
///
/// `sequence` is the last record folded into `state`; replay resumes at
/// `sequence + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub stream: StreamKey,
    pub sequence: Sequence,
    pub state: Payload,
    pub retention: Retention,
}

// ============================================================================
// Positions
// ============================================================================

/// Key of a consumer checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub handler_id: String,
    pub domain: String,
    pub root: Option<Uuid>,
}

impl PositionKey {
    pub fn new(handler_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            handler_id: handler_id.into(),
            domain: domain.into(),
            root: None,
        }
    }

    pub fn with_root(mut self, root: Uuid) -> Self {
        self.root = Some(root);
        self
    }
}

impl Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.root {
            Some(root) => write!(f, "{}@{}/{}", self.handler_id, self.domain, root),
            None => write!(f, "{}@{}", self.handler_id, self.domain),
        }
    }
}

/// The last sequence a consumer has processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub key: PositionKey,
    pub sequence: Sequence,
}

#[cfg(test)]
mod tests;
