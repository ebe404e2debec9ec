//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid artifact hash: {0:?}")]
    InvalidHash(String),

    #[error("invalid scope segment: {0:?}")]
    InvalidScope(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
