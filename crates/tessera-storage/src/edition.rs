//! Edition namespacing.
//!
//! An edition is not a service, it is a dimension of every stream key.
//! [`EditionIndex`] resolves the main-timeline aliases and is the
//! boundary edition deletion operates within: a [`Partition`] is always one
//! `(domain, edition)` pair and never spans editions.

use tessera_types::{Edition, StreamKey};

use crate::{Result, StorageError};

/// Resolution and scoping rules for editions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditionIndex;

impl EditionIndex {
    /// Resolves an edition name; `""`, `"<main>"` and the canonical main name
    /// are the same timeline.
    pub fn resolve(name: &str) -> Edition {
        Edition::new(name)
    }

    /// Returns the `(domain, edition)` partition that enumeration and
    /// deletion operate on.
    pub fn partition(domain: &str, edition: &Edition) -> Partition {
        Partition {
            domain: domain.to_string(),
            edition: edition.clone(),
        }
    }

    /// Checks that `edition` may be hard-deleted.
    ///
    /// The main timeline can never be deleted.
    pub fn ensure_deletable(edition: &Edition) -> Result<()> {
        if edition.is_main() {
            return Err(StorageError::Rejected(format!(
                "edition '{edition}' is the main timeline and cannot be deleted"
            )));
        }
        Ok(())
    }
}

/// All streams of one domain within one edition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    pub domain: String,
    pub edition: Edition,
}

impl Partition {
    pub fn contains(&self, key: &StreamKey) -> bool {
        key.domain == self.domain && key.edition == self.edition
    }
}
