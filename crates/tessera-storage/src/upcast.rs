//! On-read schema migration.
//!
//! An [`Upcaster`] is an ordered, immutable list of rules built once at
//! construction. Each rule maps one source type to a target type with a
//! transform over the payload bytes. Loading runs every record through the
//! list in order, so `V1 -> V2` followed by `V2 -> V3` upgrades a `V1`
//! record all the way to `V3` in a single pass.
//!
//! # Guarantees
//!
//! - One output record per input record, in the same order
//! - `sequence`, `created_at` and `correlation_id` are never changed
//! - A record whose type matches no rule passes through untouched
//! - Any rule failure aborts the whole load

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tessera_types::{EventRecord, Payload};

use crate::{Result, StorageError};

/// Payload transform. Returns a human-readable reason on failure.
pub type TransformFn = dyn Fn(&Bytes) -> std::result::Result<Bytes, String> + Send + Sync;

/// One `source type -> target type` migration step.
#[derive(Clone)]
pub struct UpcastRule {
    source_type: String,
    target_type: String,
    transform: Arc<TransformFn>,
}

impl UpcastRule {
    pub fn new<F>(source_type: impl Into<String>, target_type: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&Bytes) -> std::result::Result<Bytes, String> + Send + Sync + 'static,
    {
        Self {
            source_type: source_type.into(),
            target_type: target_type.into(),
            transform: Arc::new(transform),
        }
    }

    /// A rule that only renames the type and keeps the payload.
    pub fn rename(source_type: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::new(source_type, target_type, |bytes| Ok(bytes.clone()))
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }
}

impl fmt::Debug for UpcastRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpcastRule")
            .field("source_type", &self.source_type)
            .field("target_type", &self.target_type)
            .finish_non_exhaustive()
    }
}

/// Ordered chain of [`UpcastRule`]s.
#[derive(Debug, Clone, Default)]
pub struct Upcaster {
    rules: Arc<[UpcastRule]>,
}

impl Upcaster {
    /// An upcaster with no rules; every record passes through.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> UpcasterBuilder {
        UpcasterBuilder::default()
    }

    pub fn rules(&self) -> &[UpcastRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs one record through the chain.
    pub fn upcast_record(&self, mut record: EventRecord) -> Result<EventRecord> {
        for rule in self.rules.iter() {
            if record.event_type != rule.source_type {
                continue;
            }

            let Payload::Inline(bytes) = &record.payload else {
                return Err(StorageError::TransformFailed {
                    event_type: record.event_type,
                    sequence: record.sequence,
                    reason: "payload must be resolved before upcasting".to_string(),
                });
            };

            let upgraded = (rule.transform)(bytes).map_err(|reason| {
                StorageError::TransformFailed {
                    event_type: record.event_type.clone(),
                    sequence: record.sequence,
                    reason,
                }
            })?;

            record.event_type.clone_from(&rule.target_type);
            record.payload = Payload::Inline(upgraded);
        }
        Ok(record)
    }

    /// Runs every record through the chain; the first failure aborts.
    pub fn upcast(&self, records: Vec<EventRecord>) -> Result<Vec<EventRecord>> {
        if records.is_empty() || self.rules.is_empty() {
            return Ok(records);
        }

        let input_len = records.len();
        let upgraded = records
            .into_iter()
            .map(|record| self.upcast_record(record))
            .collect::<Result<Vec<_>>>()?;

        debug_assert_eq!(upgraded.len(), input_len, "upcasting must be one-to-one");
        Ok(upgraded)
    }
}

/// Builds an [`Upcaster`]; rules apply in insertion order.
#[derive(Debug, Default)]
pub struct UpcasterBuilder {
    rules: Vec<UpcastRule>,
}

impl UpcasterBuilder {
    pub fn rule(mut self, rule: UpcastRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn transform<F>(
        self,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        transform: F,
    ) -> Self
    where
        F: Fn(&Bytes) -> std::result::Result<Bytes, String> + Send + Sync + 'static,
    {
        self.rule(UpcastRule::new(source_type, target_type, transform))
    }

    pub fn rename(self, source_type: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.rule(UpcastRule::rename(source_type, target_type))
    }

    pub fn build(self) -> Upcaster {
        Upcaster {
            rules: self.rules.into(),
        }
    }
}
