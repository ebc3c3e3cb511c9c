//! Engine-level error type: flattens every lower-layer error into the
//! taxonomy of spec section 7 (validation / corruption / I/O / lock /
//! metadata store), so callers match on one enum regardless of which
//! component failed.

use recollex_core::LimitError;
use recollex_storage::{ArrayFileError, CompactionError, LockError, ManifestError, MetaStoreError, StorageError};
use thiserror::Error;

/// Result type used throughout the engine crate and re-exported at the
/// workspace root.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by `Engine` operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller-supplied input failed validation; no state was changed.
    #[error("validation error: {0}")]
    Validation(String),

    /// On-disk data failed an integrity check.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest's cross-process file lock could not be acquired within
    /// the configured timeout.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// The embedded metadata store returned an error.
    #[error("metadata store error: {0}")]
    Meta(#[from] MetaStoreError),
}

impl EngineError {
    /// Construct a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Construct a corruption error from any displayable message.
    pub fn corruption(msg: impl Into<String>) -> Self {
        EngineError::Corruption(msg.into())
    }
}

impl From<LimitError> for EngineError {
    fn from(e: LimitError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl From<ManifestError> for EngineError {
    fn from(e: ManifestError) -> Self {
        EngineError::Corruption(e.to_string())
    }
}

impl From<ArrayFileError> for EngineError {
    fn from(e: ArrayFileError) -> Self {
        EngineError::Corruption(e.to_string())
    }
}

impl From<CompactionError> for EngineError {
    fn from(e: CompactionError) -> Self {
        match e {
            CompactionError::Io(io) => EngineError::Io(io),
            other => EngineError::Corruption(other.to_string()),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Manifest(m) => m.into(),
            StorageError::Meta(m) => m.into(),
            StorageError::Lock(l) => l.into(),
            StorageError::Io(io) => io.into(),
        }
    }
}
