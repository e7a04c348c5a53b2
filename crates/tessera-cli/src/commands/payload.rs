//! Payload store maintenance against a filesystem blob directory.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tessera::{ContentHash, FsBlobs, PayloadStore, SystemClock};
use tessera_config::{ConfigLoader, TesseraConfig};

/// Where the blob directory comes from.
pub struct Target<'a> {
    pub project: &'a str,
    pub dir: Option<&'a Path>,
}

impl Target<'_> {
    fn config(&self) -> Result<TesseraConfig> {
        ConfigLoader::new()
            .with_project_dir(self.project)
            .load()
            .context("Failed to load configuration")
    }

    fn open(&self) -> Result<(PayloadStore, TesseraConfig)> {
        let config = self.config()?;
        let dir: PathBuf = self
            .dir
            .map_or_else(|| config.payloads.directory.clone(), Path::to_path_buf);
        let blobs = FsBlobs::open(&dir)
            .with_context(|| format!("Failed to open blob directory {}", dir.display()))?;
        tracing::debug!(dir = %dir.display(), "opened blob directory");
        let store = PayloadStore::new(
            Arc::new(blobs),
            config.payloads.threshold_bytes,
            Arc::new(SystemClock),
        );
        Ok((store, config))
    }
}

fn parse_hash(hex: &str) -> Result<ContentHash> {
    ContentHash::from_hex(hex)
        .with_context(|| format!("'{hex}' is not a 64-character hex SHA-256"))
}

/// Stores a file (or stdin for `-`) and prints its reference.
pub fn put(target: &Target<'_>, file: &str) -> Result<()> {
    let (store, _) = target.open()?;

    let data = if file == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(file).with_context(|| format!("Failed to read {file}"))?
    };

    let reference = store.offload(&Bytes::from(data))?;
    println!("{}", reference.content_hash);
    println!("  size: {} bytes", reference.original_size);
    println!("  stored at: {}", reference.stored_at);
    println!("  uri: {}", reference.uri);
    Ok(())
}

/// Writes the verified bytes of `hash` to `out`, or stdout.
pub fn get(target: &Target<'_>, hash: &str, out: Option<&Path>) -> Result<()> {
    let (store, _) = target.open()?;
    let data = store.fetch(&parse_hash(hash)?)?;

    match out {
        Some(path) => std::fs::write(path, &data)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(&data)?,
    }
    Ok(())
}

/// Prints blob count and total size.
pub fn stat(target: &Target<'_>) -> Result<()> {
    let (store, _) = target.open()?;
    let stats = store.stats()?;
    println!("blobs: {}", stats.blobs);
    println!("bytes: {}", stats.bytes);
    Ok(())
}

/// Lists, or with `force` deletes, blobs untouched for longer than the max age.
///
/// The CLI cannot see which blobs live streams and snapshots reference, so
/// by default nothing is removed; `keep` names hashes known to be referenced.
pub fn sweep(
    target: &Target<'_>,
    max_age_secs: Option<u64>,
    keep: &[String],
    force: bool,
) -> Result<()> {
    let (store, config) = target.open()?;
    let max_age = max_age_secs.map_or_else(|| config.payloads.sweep_max_age(), Duration::from_secs);

    let live = keep
        .iter()
        .map(|h| parse_hash(h))
        .collect::<Result<HashSet<_>>>()?;

    if !force {
        let candidates = store.sweep_candidates(max_age, &live)?;
        for entry in &candidates {
            println!("would delete: {} ({} bytes)", entry.hash, entry.size);
        }
        println!(
            "dry run: {} blob(s) eligible, pass --force to delete",
            candidates.len()
        );
        return Ok(());
    }

    tracing::warn!(kept = live.len(), "forced sweep without a reference mark pass");
    let report = store.sweep(max_age, &live)?;
    println!("examined: {}", report.examined);
    println!("deleted: {}", report.deleted);
    println!("retained (referenced): {}", report.retained_live);
    println!("bytes freed: {}", report.bytes_freed);
    Ok(())
}

/// Re-hashes every blob; fails if any is corrupted.
pub fn verify(target: &Target<'_>) -> Result<()> {
    let (store, _) = target.open()?;
    let corrupted = store.verify_all()?;
    if corrupted.is_empty() {
        println!("All blobs verified");
        return Ok(());
    }
    for hash in &corrupted {
        println!("corrupted: {hash}");
    }
    anyhow::bail!("{} corrupted blob(s)", corrupted.len())
}
