//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("size mismatch: expected {expected} bytes, received {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Transport or credential failures talking to a remote backend.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Config(_))
    }
}

impl From<trc_core::Error> for StorageError {
    fn from(err: trc_core::Error) -> Self {
        Self::InvalidKey(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Collapses `NotFound` into `Ok(None)`.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> StorageResult<Option<T>>;
}

impl<T> OptionalExt<T> for StorageResult<T> {
    fn optional(self) -> StorageResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
