//! Error taxonomy for the storage core.

use tessera_types::{ContentHash, Sequence, StreamKey};

/// Result alias used throughout the storage crate.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Errors returned by the storage components.
///
/// Conflicts and rejections are returned to the caller as-is; nothing in
/// this crate retries on the caller's behalf.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// The caller's expected sequence is not the stream's next sequence.
    #[error("sequence conflict on {stream}: expected {expected}, actual {actual}")]
    SequenceConflict {
        stream: StreamKey,
        expected: Sequence,
        actual: Sequence,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// Retrieved bytes do not hash to the referenced content hash.
    #[error("integrity check failed: expected {expected}, computed {actual}")]
    IntegrityFailed {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Structurally valid but forbidden by policy.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("upcast of '{event_type}' at sequence {sequence} failed: {reason}")]
    TransformFailed {
        event_type: String,
        sequence: Sequence,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub(crate) fn poisoned() -> Self {
        StorageError::Internal("lock poisoned".to_string())
    }

    /// Returns the flat error category callers branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::SequenceConflict { .. } => ErrorKind::SequenceConflict,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::IntegrityFailed { .. } => ErrorKind::IntegrityFailed,
            StorageError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StorageError::Rejected(_) => ErrorKind::Rejected,
            StorageError::TransformFailed { .. } => ErrorKind::TransformFailed,
            StorageError::Io(_) | StorageError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Category of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SequenceConflict,
    NotFound,
    IntegrityFailed,
    InvalidArgument,
    Rejected,
    TransformFailed,
    Internal,
}
