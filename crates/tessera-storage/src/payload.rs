//! Content-addressed payload offloading (claim-check).
//!
//! Payloads larger than the configured threshold are written to a
//! [`BlobBackend`] under their SHA-256 and replaced inline by a
//! [`PayloadReference`]. Identical bytes always resolve to one blob.
//!
//! # Integrity
//!
//! Every resolve recomputes the hash of the retrieved bytes. A mismatch is
//! reported as [`StorageError::IntegrityFailed`]; corrupted bytes are never
//! returned.
//!
//! # Reclaim
//!
//! [`PayloadStore::sweep`] is the sweep half of a mark-sweep: the caller
//! supplies the set of hashes still reachable from streams and snapshots,
//! and only blobs outside that set, untouched for longer than `max_age`,
//! are deleted. The age is re-checked at deletion time under the backend's
//! write lock, so a dedup hit that lands mid-sweep keeps its blob.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tessera_crypto::content_hash;
use tessera_types::{ContentHash, Payload, PayloadReference};

use crate::{BlobBackend, BlobEntry, Clock, MemoryBlobs, Result, StorageError, SystemClock};

/// Default offload threshold in bytes (256 KiB).
pub const DEFAULT_OFFLOAD_THRESHOLD: usize = 256 * 1024;

/// Outcome of a sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub deleted: usize,
    /// Expired blobs kept because something still references them.
    pub retained_live: usize,
    pub bytes_freed: u64,
}

/// Blob count and size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadStats {
    pub blobs: usize,
    pub bytes: u64,
}

/// Content-addressed blob store with dedup and TTL sweep.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    backend: Arc<dyn BlobBackend>,
    threshold: usize,
    clock: Arc<dyn Clock>,
}

impl PayloadStore {
    pub fn new(backend: Arc<dyn BlobBackend>, threshold: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            threshold,
            clock,
        }
    }

    /// In-memory store with the system clock.
    pub fn in_memory(threshold: usize) -> Self {
        Self::new(Arc::new(MemoryBlobs::new()), threshold, Arc::new(SystemClock))
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn backend(&self) -> &Arc<dyn BlobBackend> {
        &self.backend
    }

    /// Returns true if a payload of `len` bytes must be offloaded.
    pub fn should_offload(&self, len: usize) -> bool {
        len > self.threshold
    }

    /// Stores `data` and returns its reference.
    ///
    /// Offloading bytes that are already stored returns a reference to the
    /// existing blob (same hash, same `stored_at`) without writing again.
    pub fn offload(&self, data: &Bytes) -> Result<PayloadReference> {
        let hash = content_hash(data);
        let (entry, created) = self
            .backend
            .put_if_absent(hash, data, self.clock.now())?;

        if created {
            tracing::debug!(hash = %hash, size = data.len(), "offloaded payload");
        } else {
            tracing::debug!(hash = %hash, "payload already stored, reusing blob");
        }

        Ok(PayloadReference {
            content_hash: hash,
            storage_type: self.backend.storage_type(),
            uri: self.backend.uri(&hash),
            original_size: entry.size,
            stored_at: entry.stored_at,
        })
    }

    /// Offloads an inline payload if it exceeds the threshold; otherwise
    /// returns it unchanged.
    pub fn externalize(&self, payload: Payload) -> Result<Payload> {
        match payload {
            Payload::Inline(bytes) if self.should_offload(bytes.len()) => {
                Ok(Payload::External(self.offload(&bytes)?))
            }
            other => Ok(other),
        }
    }

    /// Fetches and verifies the bytes behind `reference`.
    pub fn resolve(&self, reference: &PayloadReference) -> Result<Bytes> {
        if reference.storage_type != self.backend.storage_type() {
            return Err(StorageError::NotFound(format!(
                "payload {} lives in {} storage, this store serves {}",
                reference.content_hash,
                reference.storage_type,
                self.backend.storage_type()
            )));
        }

        self.fetch(&reference.content_hash)
    }

    /// Fetches and verifies the blob stored under `hash` in this store's backend.
    pub fn fetch(&self, hash: &ContentHash) -> Result<Bytes> {
        let data = self
            .backend
            .get(hash)?
            .ok_or_else(|| StorageError::NotFound(format!("payload {hash}")))?;

        let actual = content_hash(&data);
        if actual != *hash {
            tracing::warn!(
                expected = %hash,
                actual = %actual,
                uri = %self.backend.uri(hash),
                "payload integrity check failed"
            );
            return Err(StorageError::IntegrityFailed {
                expected: *hash,
                actual,
            });
        }

        Ok(data)
    }

    /// Re-hashes every stored blob and returns the ones that fail.
    pub fn verify_all(&self) -> Result<Vec<ContentHash>> {
        let mut corrupted = Vec::new();
        for entry in self.backend.entries()? {
            match self.fetch(&entry.hash) {
                Ok(_) => {}
                Err(StorageError::IntegrityFailed { .. } | StorageError::NotFound(_)) => {
                    corrupted.push(entry.hash);
                }
                Err(e) => return Err(e),
            }
        }
        corrupted.sort_unstable();
        Ok(corrupted)
    }

    /// Returns the bytes of a payload, resolving it if offloaded.
    pub fn resolve_payload(&self, payload: &Payload) -> Result<Bytes> {
        match payload {
            Payload::Inline(bytes) => Ok(bytes.clone()),
            Payload::External(reference) => self.resolve(reference),
        }
    }

    /// Lists the blobs a sweep with the same arguments would delete, by hash.
    ///
    /// Nothing is removed; a dedup hit before the real sweep still keeps a
    /// listed blob.
    pub fn sweep_candidates(
        &self,
        max_age: Duration,
        live: &HashSet<ContentHash>,
    ) -> Result<Vec<BlobEntry>> {
        let cutoff = self.clock.now().saturating_sub(max_age);
        let mut candidates: Vec<_> = self
            .backend
            .entries()?
            .into_iter()
            .filter(|e| e.touched_at < cutoff && !live.contains(&e.hash))
            .collect();
        candidates.sort_unstable_by_key(|e| e.hash);
        Ok(candidates)
    }

    /// Deletes blobs untouched for longer than `max_age` that are not in `live`.
    pub fn sweep(&self, max_age: Duration, live: &HashSet<ContentHash>) -> Result<SweepReport> {
        let cutoff = self.clock.now().saturating_sub(max_age);
        let mut report = SweepReport::default();

        for entry in self.backend.entries()? {
            report.examined += 1;
            if entry.touched_at >= cutoff {
                continue;
            }
            if live.contains(&entry.hash) {
                report.retained_live += 1;
                continue;
            }
            if let Some(removed) = self.backend.delete_if_untouched_since(&entry.hash, cutoff)? {
                report.deleted += 1;
                report.bytes_freed += removed.size;
            }
        }

        tracing::info!(
            examined = report.examined,
            deleted = report.deleted,
            retained_live = report.retained_live,
            bytes_freed = report.bytes_freed,
            "payload sweep complete"
        );
        Ok(report)
    }

    pub fn stats(&self) -> Result<PayloadStats> {
        let entries = self.backend.entries()?;
        Ok(PayloadStats {
            blobs: entries.len(),
            bytes: entries.iter().map(|e| e.size).sum(),
        })
    }
}
