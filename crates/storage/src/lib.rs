//! Artifact storage abstraction and backends for TRC.
//!
//! This crate provides:
//! - The [`ArtifactStore`] trait: head, get, put, and batched query
//! - Backends: local filesystem and S3-compatible
//! - A factory that picks the backend from config once at startup

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{
    Artifact, ArtifactStore, ByteStream, QUERY_CONCURRENCY, QueryResult, collect_body,
};

use std::sync::Arc;
use trc_core::config::StorageConfig;

/// Create an artifact store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ArtifactStore>> {
    match config {
        StorageConfig::Local { root_dir } => {
            let backend = FilesystemBackend::new(root_dir).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3(s3) => {
            let backend = S3Backend::new(s3).await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trc_core::config::S3Config;
    use trc_core::{ArtifactHash, ArtifactMetadata, ArtifactScope};

    #[tokio::test]
    async fn from_config_local_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Local {
            root_dir: temp.path().join("store"),
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "local");

        let hash = ArtifactHash::parse("beef").unwrap();
        let scope = ArtifactScope::default();
        store
            .put(
                &hash,
                &scope,
                Artifact::from_bytes(ArtifactMetadata::default(), "hi"),
            )
            .await
            .unwrap();
        assert_eq!(store.head(&hash, &scope).await.unwrap().unwrap().size, 2);
    }

    #[tokio::test]
    async fn from_config_s3_ok() {
        let mut s3 = S3Config::new("bucket", "us-east-1");
        s3.endpoint = Some("minio:9000".to_string());
        s3.prefix = Some("trc".to_string());
        s3.force_path_style = true;

        let store = from_config(&StorageConfig::S3(s3)).await.unwrap();
        assert_eq!(store.backend_name(), "s3");
    }
}
