//! Error types for the Tessera facade.

use tessera_storage::{ErrorKind, StorageError};

use crate::collab::CollaboratorError;

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Errors returned by [`crate::Tessera`].
#[derive(thiserror::Error, Debug)]
pub enum TesseraError {
    /// Any failure of the storage core.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A collaborator (bus, dead-letter sink, notification channel) refused delivery.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Opening the configured payload backend failed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TesseraError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TesseraError::Storage(StorageError::InvalidArgument(message.into()))
    }

    /// Returns the flat error category callers branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TesseraError::Storage(e) => e.kind(),
            TesseraError::Collaborator(_) => ErrorKind::Internal,
            TesseraError::Config(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Returns the storage error, if this is one.
    pub fn as_storage(&self) -> Option<&StorageError> {
        match self {
            TesseraError::Storage(e) => Some(e),
            _ => None,
        }
    }
}
