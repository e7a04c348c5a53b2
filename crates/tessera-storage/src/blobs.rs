//! Blob backends for the payload store.
//!
//! A backend only knows how to keep bytes under a content hash. Hashing,
//! thresholds and integrity checks live in [`crate::PayloadStore`].
//!
//! # Filesystem Layout
//!
//! ```text
//! {root}/
//! └── ab/
//!     ├── ab12...ef           <- blob bytes (write-once)
//!     └── ab12...ef.meta.json <- stored_at / touched_at / size
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tessera_types::{ContentHash, StorageType, Timestamp};

use crate::{Result, StorageError};

/// Metadata about one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub hash: ContentHash,
    pub size: u64,
    /// When the blob was first written.
    pub stored_at: Timestamp,
    /// Last time a writer asked for this content, new or deduplicated.
    pub touched_at: Timestamp,
}

/// Storage medium for content-addressed blobs.
///
/// `put_if_absent` must be idempotent: a second put of the same hash keeps
/// the first blob, refreshes `touched_at`, and reports `created == false`.
pub trait BlobBackend: Send + Sync + Debug {
    fn storage_type(&self) -> StorageType;

    /// Locator recorded in payload references.
    fn uri(&self, hash: &ContentHash) -> String;

    /// Stores `data` under `hash` unless already present.
    ///
    /// Returns the entry and whether this call created it.
    fn put_if_absent(
        &self,
        hash: ContentHash,
        data: &Bytes,
        now: Timestamp,
    ) -> Result<(BlobEntry, bool)>;

    /// Returns the stored bytes, or `None` if absent.
    fn get(&self, hash: &ContentHash) -> Result<Option<Bytes>>;

    /// Removes a blob. Returns false if it was already absent.
    fn delete(&self, hash: &ContentHash) -> Result<bool>;

    /// Removes a blob only if its `touched_at` is still before `cutoff`.
    ///
    /// The check and the removal are atomic with respect to `put_if_absent`,
    /// so a dedup hit that lands after the caller listed the blob keeps it.
    /// Returns the removed entry.
    fn delete_if_untouched_since(
        &self,
        hash: &ContentHash,
        cutoff: Timestamp,
    ) -> Result<Option<BlobEntry>>;

    /// Lists every stored blob.
    fn entries(&self) -> Result<Vec<BlobEntry>>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Blobs held in process memory.
#[derive(Debug, Default)]
pub struct MemoryBlobs {
    blobs: RwLock<HashMap<ContentHash, (BlobEntry, Bytes)>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobBackend for MemoryBlobs {
    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }

    fn uri(&self, hash: &ContentHash) -> String {
        format!("memory://{hash}")
    }

    fn put_if_absent(
        &self,
        hash: ContentHash,
        data: &Bytes,
        now: Timestamp,
    ) -> Result<(BlobEntry, bool)> {
        let mut blobs = self.blobs.write().map_err(|_| StorageError::poisoned())?;
        if let Some((entry, _)) = blobs.get_mut(&hash) {
            entry.touched_at = entry.touched_at.max(now);
            return Ok((entry.clone(), false));
        }

        let entry = BlobEntry {
            hash,
            size: data.len() as u64,
            stored_at: now,
            touched_at: now,
        };
        blobs.insert(hash, (entry.clone(), data.clone()));
        Ok((entry, true))
    }

    fn get(&self, hash: &ContentHash) -> Result<Option<Bytes>> {
        let blobs = self.blobs.read().map_err(|_| StorageError::poisoned())?;
        Ok(blobs.get(hash).map(|(_, data)| data.clone()))
    }

    fn delete(&self, hash: &ContentHash) -> Result<bool> {
        let mut blobs = self.blobs.write().map_err(|_| StorageError::poisoned())?;
        Ok(blobs.remove(hash).is_some())
    }

    fn delete_if_untouched_since(
        &self,
        hash: &ContentHash,
        cutoff: Timestamp,
    ) -> Result<Option<BlobEntry>> {
        let mut blobs = self.blobs.write().map_err(|_| StorageError::poisoned())?;
        let stale = blobs
            .get(hash)
            .is_some_and(|(entry, _)| entry.touched_at < cutoff);
        if !stale {
            return Ok(None);
        }
        Ok(blobs.remove(hash).map(|(entry, _)| entry))
    }

    fn entries(&self) -> Result<Vec<BlobEntry>> {
        let blobs = self.blobs.read().map_err(|_| StorageError::poisoned())?;
        Ok(blobs.values().map(|(entry, _)| entry.clone()).collect())
    }
}

// ============================================================================
// Filesystem backend
// ============================================================================

const META_SUFFIX: &str = ".meta.json";

/// Blobs stored one file per hash under a root directory.
///
/// Blob files are written to a temporary name and renamed into place, so a
/// reader never observes a partially written blob.
#[derive(Debug)]
pub struct FsBlobs {
    root: PathBuf,
    /// Serializes writers within this process so the metadata sidecar and the
    /// blob file agree.
    write_lock: Mutex<()>,
}

impl FsBlobs {
    /// Opens (creating if needed) a blob directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fan_out_dir(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[..2])
    }

    /// Path of the blob file for `hash`.
    pub fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.fan_out_dir(hash).join(hash.to_hex())
    }

    fn meta_path(&self, hash: &ContentHash) -> PathBuf {
        self.fan_out_dir(hash)
            .join(format!("{}{META_SUFFIX}", hash.to_hex()))
    }

    fn read_meta(&self, hash: &ContentHash) -> Result<Option<BlobEntry>> {
        let path = self.meta_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        let entry = serde_json::from_str(&json).map_err(std::io::Error::other)?;
        Ok(Some(entry))
    }

    fn write_meta(&self, entry: &BlobEntry) -> Result<()> {
        let json = serde_json::to_vec_pretty(entry).map_err(std::io::Error::other)?;
        write_atomically(&self.meta_path(&entry.hash), &json)
    }

    /// Reads the entry for a stored blob, or `None` if the blob file is gone.
    ///
    /// A blob without a sidecar (crash between the two renames) is dated by
    /// the blob file's modification time.
    fn entry(&self, hash: &ContentHash) -> Result<Option<BlobEntry>> {
        if let Some(entry) = self.read_meta(hash)? {
            return Ok(Some(entry));
        }
        let metadata = match fs::metadata(self.blob_path(hash)) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let written = Timestamp::from_system_time(metadata.modified()?);
        Ok(Some(BlobEntry {
            hash: *hash,
            size: metadata.len(),
            stored_at: written,
            touched_at: written,
        }))
    }

    /// Removes the blob file and its sidecar. Caller holds `write_lock`.
    fn remove_files(&self, hash: &ContentHash) -> Result<bool> {
        let existed = match fs::remove_file(self.blob_path(hash)) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        match fs::remove_file(self.meta_path(hash)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(existed)
    }
}

/// Writes `data` to a sibling temp file, syncs it, then renames over `path`.
fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl BlobBackend for FsBlobs {
    fn storage_type(&self) -> StorageType {
        StorageType::Filesystem
    }

    fn uri(&self, hash: &ContentHash) -> String {
        format!("file://{}", self.blob_path(hash).display())
    }

    fn put_if_absent(
        &self,
        hash: ContentHash,
        data: &Bytes,
        now: Timestamp,
    ) -> Result<(BlobEntry, bool)> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::poisoned())?;

        let blob_path = self.blob_path(&hash);
        if blob_path.exists() {
            let mut entry = self.read_meta(&hash)?.unwrap_or(BlobEntry {
                hash,
                size: data.len() as u64,
                stored_at: now,
                touched_at: now,
            });
            entry.touched_at = entry.touched_at.max(now);
            self.write_meta(&entry)?;
            return Ok((entry, false));
        }

        fs::create_dir_all(self.fan_out_dir(&hash))?;
        write_atomically(&blob_path, data)?;

        let entry = BlobEntry {
            hash,
            size: data.len() as u64,
            stored_at: now,
            touched_at: now,
        };
        self.write_meta(&entry)?;
        Ok((entry, true))
    }

    fn get(&self, hash: &ContentHash) -> Result<Option<Bytes>> {
        match fs::read(self.blob_path(hash)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, hash: &ContentHash) -> Result<bool> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::poisoned())?;
        self.remove_files(hash)
    }

    fn delete_if_untouched_since(
        &self,
        hash: &ContentHash,
        cutoff: Timestamp,
    ) -> Result<Option<BlobEntry>> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::poisoned())?;
        let Some(entry) = self.entry(hash)? else {
            return Ok(None);
        };
        if entry.touched_at >= cutoff {
            return Ok(None);
        }
        Ok(self.remove_files(hash)?.then_some(entry))
    }

    fn entries(&self) -> Result<Vec<BlobEntry>> {
        let mut entries = Vec::new();
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for file in fs::read_dir(shard.path())? {
                let name = file?.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name.ends_with(META_SUFFIX) || name.ends_with(".tmp") {
                    continue;
                }
                let Some(hash) = ContentHash::from_hex(name) else {
                    continue;
                };
                if let Some(entry) = self.entry(&hash)? {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }
}
