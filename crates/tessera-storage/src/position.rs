//! Consumer checkpoints.
//!
//! A position is the last sequence a handler has processed. Puts are
//! last-write-wins; the store makes no ordering promise between concurrent
//! puts to the same key, so handlers that need exactly-once delivery must
//! treat the stored value as a low-water mark and make their own effects
//! idempotent.

use std::collections::HashMap;
use std::sync::RwLock;

use tessera_types::{Position, PositionKey, Sequence};

use crate::{Result, StorageError};

/// Checkpoint ledger keyed by `(handler, domain[, root])`.
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: RwLock<HashMap<PositionKey, Sequence>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> Result<Option<Sequence>> {
        let positions = self.positions.read().map_err(|_| StorageError::poisoned())?;
        Ok(positions.get(key).copied())
    }

    pub fn put(&self, key: PositionKey, sequence: Sequence) -> Result<()> {
        if key.handler_id.is_empty() || key.domain.is_empty() {
            return Err(StorageError::InvalidArgument(
                "position requires a handler id and a domain".to_string(),
            ));
        }
        tracing::debug!(position = %key, sequence = %sequence, "put position");
        let mut positions = self
            .positions
            .write()
            .map_err(|_| StorageError::poisoned())?;
        positions.insert(key, sequence);
        Ok(())
    }

    /// Every checkpoint held by `handler_id`, sorted by key.
    pub fn positions_for(&self, handler_id: &str) -> Result<Vec<Position>> {
        let positions = self.positions.read().map_err(|_| StorageError::poisoned())?;
        let mut found: Vec<Position> = positions
            .iter()
            .filter(|(key, _)| key.handler_id == handler_id)
            .map(|(key, sequence)| Position {
                key: key.clone(),
                sequence: *sequence,
            })
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }
}
