//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::pin::Pin;
use trc_core::{ArtifactHash, ArtifactMetadata, ArtifactScope};

/// A boxed stream of bytes for streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Per-hash lookup results; `None` marks an absent artifact.
pub type QueryResult = BTreeMap<ArtifactHash, Option<ArtifactMetadata>>;

/// Maximum concurrent lookups issued by [`ArtifactStore::query`].
pub const QUERY_CONCURRENCY: usize = 16;

/// An artifact body paired with its metadata.
pub struct Artifact {
    pub metadata: ArtifactMetadata,
    pub body: ByteStream,
}

impl Artifact {
    pub fn new(metadata: ArtifactMetadata, body: ByteStream) -> Self {
        Self { metadata, body }
    }

    /// Artifact backed by an in-memory buffer; `size` is taken from the buffer.
    pub fn from_bytes(metadata: ArtifactMetadata, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let metadata = ArtifactMetadata {
            size: data.len() as u64,
            ..metadata
        };
        Self {
            metadata,
            body: Box::pin(futures::stream::once(async move { Ok(data) })),
        }
    }

    /// Drain the body into a single buffer.
    pub async fn into_bytes(self) -> StorageResult<Bytes> {
        collect_body(self.body).await
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Read a byte stream to completion.
pub async fn collect_body(body: ByteStream) -> StorageResult<Bytes> {
    let buf = body
        .try_fold(BytesMut::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await?;
    Ok(buf.freeze())
}

/// Artifact storage keyed by `(scope, hash)`.
///
/// Implementations normalize "does not exist" to `Ok(None)`; errors are
/// reserved for I/O, transport, and corrupt-metadata failures.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Get an artifact's metadata without its body.
    async fn head(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
    ) -> StorageResult<Option<ArtifactMetadata>>;

    /// Get an artifact's metadata and a lazy body stream.
    async fn get(&self, hash: &ArtifactHash, scope: &ArtifactScope)
    -> StorageResult<Option<Artifact>>;

    /// Store an artifact, replacing any previous one under the same key.
    ///
    /// Fails with `SizeMismatch` when the body length differs from
    /// `metadata.size`; nothing is stored in that case.
    async fn put(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
        artifact: Artifact,
    ) -> StorageResult<()>;

    /// Look up many hashes at once. Duplicates collapse to a single entry.
    async fn query(
        &self,
        hashes: &[ArtifactHash],
        scope: &ArtifactScope,
    ) -> StorageResult<QueryResult> {
        let unique: BTreeSet<ArtifactHash> = hashes.iter().cloned().collect();
        let found: Vec<(ArtifactHash, Option<ArtifactMetadata>)> = futures::stream::iter(unique)
            .map(|hash: ArtifactHash| async move {
                let metadata = self.head(&hash, scope).await?;
                Ok::<_, crate::StorageError>((hash, metadata))
            })
            .buffer_unordered(QUERY_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(found.into_iter().collect())
    }

    /// Get the name of this storage backend, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called once during startup, before the server accepts requests.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers `head` for a fixed set of hashes and counts lookups.
    struct CountingStore {
        present: BTreeSet<ArtifactHash>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactStore for CountingStore {
        async fn head(
            &self,
            hash: &ArtifactHash,
            _scope: &ArtifactScope,
        ) -> StorageResult<Option<ArtifactMetadata>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .present
                .contains(hash)
                .then(|| ArtifactMetadata::new(hash.as_str().len() as u64)))
        }

        async fn get(
            &self,
            _hash: &ArtifactHash,
            _scope: &ArtifactScope,
        ) -> StorageResult<Option<Artifact>> {
            Ok(None)
        }

        async fn put(
            &self,
            _hash: &ArtifactHash,
            _scope: &ArtifactScope,
            _artifact: Artifact,
        ) -> StorageResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    fn hash(s: &str) -> ArtifactHash {
        ArtifactHash::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_query_collapses_duplicates() {
        let store = CountingStore {
            present: [hash("aa")].into(),
            lookups: AtomicUsize::new(0),
        };

        let result = store
            .query(
                &[hash("aa"), hash("bb"), hash("aa"), hash("bb")],
                &ArtifactScope::default(),
            )
            .await
            .unwrap();

        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[&hash("aa")], Some(ArtifactMetadata::new(2)));
        assert_eq!(result[&hash("bb")], None);
    }

    #[tokio::test]
    async fn test_query_from_trait_object() {
        let store: std::sync::Arc<dyn ArtifactStore> = std::sync::Arc::new(CountingStore {
            present: (0..40).map(|i| hash(&format!("{i:04x}"))).collect(),
            lookups: AtomicUsize::new(0),
        });
        let hashes: Vec<ArtifactHash> = (0..64).map(|i| hash(&format!("{i:04x}"))).collect();

        let result = store.query(&hashes, &ArtifactScope::default()).await.unwrap();
        assert_eq!(result.len(), 64);
        assert_eq!(result.values().filter(|m| m.is_some()).count(), 40);
    }
}
