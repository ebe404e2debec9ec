//! Core domain types and config resolution for the TRC remote cache.
//!
//! This crate defines the data model shared by the other crates:
//! - Artifact hashes and their validation
//! - Artifact metadata and `(teamId, slug)` scoping
//! - Layered configuration resolution

pub mod artifact;
pub mod config;
pub mod error;
pub mod hash;

pub use artifact::{ArtifactMetadata, ArtifactScope, UNSCOPED_SEGMENT};
pub use config::{Config, ConfigError, ConfigIssue};
pub use error::{Error, Result};
pub use hash::{ArtifactHash, is_valid_hash};
