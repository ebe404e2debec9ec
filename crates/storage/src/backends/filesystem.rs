//! Local filesystem storage backend.
//!
//! Layout: `<root>/<team>/<slug>/<hash>` holds the body and
//! `<root>/<team>/<slug>/<hash>.json` the metadata. Both are written to a
//! uniquely named temp file, fsynced, and renamed into place, body first.
//!
//! The two renames of a `put` happen under a per-path lock, and `get` pairs
//! the sidecar with an open body handle under the same lock, so a body is
//! never served with another writer's metadata.

use crate::error::{OptionalExt, StorageError, StorageResult};
use crate::traits::{Artifact, ArtifactStore, ByteStream};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;
use trc_core::{ArtifactHash, ArtifactMetadata, ArtifactScope};
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem artifact store.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

/// Exclusive hold on one artifact path. The map entry is dropped once the
/// last holder releases it.
struct PathLock<'a> {
    locks: &'a DashMap<PathBuf, Arc<Mutex<()>>>,
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.path, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating `root` if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            locks: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Content path for an artifact, with traversal protection.
    ///
    /// Filesystem checks run on the blocking pool.
    async fn artifact_path(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
    ) -> StorageResult<PathBuf> {
        let key = scope.object_key(hash)?;
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || resolve_under_root(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    async fn lock_path(&self, path: &Path) -> PathLock<'_> {
        let lock = Arc::clone(&self.locks.entry(path.to_path_buf()).or_default());
        let guard = lock.lock_owned().await;
        PathLock {
            locks: &self.locks,
            path: path.to_path_buf(),
            guard: Some(guard),
        }
    }

    async fn read_metadata(&self, path: &Path, key: &str) -> StorageResult<ArtifactMetadata> {
        let raw = fs::read(metadata_path(path)).await.map_err(|e| not_found(e, key))?;
        serde_json::from_slice(&raw)
            .map_err(|e| StorageError::InvalidMetadata(format!("{key}.json: {e}")))
    }
}

/// Join `key` under `root`, refusing anything that would land outside it,
/// including through symlinked directories.
fn resolve_under_root(root: &Path, key: &str) -> StorageResult<PathBuf> {
    if !Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "contains unsafe path component: {key}"
        )));
    }

    let path = root.join(key);
    let root_canonical = root.canonicalize().map_err(|e| {
        StorageError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to canonicalize root: {e}"),
        ))
    })?;

    // Check the deepest existing ancestor (or the path itself).
    let mut candidate = Some(path.as_path());
    while let Some(current) = candidate {
        match std::fs::symlink_metadata(current) {
            Ok(meta) => {
                let canonical = current.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!("dangling symlink in key: {key}"))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                candidate = current.parent();
            }
            Err(err) => return Err(StorageError::Io(err)),
        }
    }

    Ok(path)
}

fn metadata_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".json");
    path.with_file_name(name)
}

/// Unique sibling temp path: `<name>.tmp.<uuid>`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp.{}", Uuid::new_v4()));
    path.with_file_name(name)
}

fn not_found(err: std::io::Error, key: &str) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file");
    }
}

/// Stream `body` into a fresh temp file next to `path` and fsync it.
/// Returns the temp path and the number of bytes written. The temp file is
/// removed on failure.
async fn write_temp(path: &Path, mut body: ByteStream) -> StorageResult<(PathBuf, u64)> {
    let temp = temp_path(path);
    let written = async {
        let mut file = fs::File::create(&temp).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;
        Ok::<_, StorageError>(written)
    }
    .await;

    match written {
        Ok(written) => Ok((temp, written)),
        Err(e) => {
            remove_quietly(&temp).await;
            Err(e)
        }
    }
}

async fn rename_into_place(temp: &Path, path: &Path) -> StorageResult<()> {
    if let Err(e) = fs::rename(temp, path).await {
        remove_quietly(temp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "local"))]
    async fn head(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
    ) -> StorageResult<Option<ArtifactMetadata>> {
        let path = self.artifact_path(hash, scope).await?;
        self.read_metadata(&path, hash.as_str()).await.optional()
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn get(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
    ) -> StorageResult<Option<Artifact>> {
        use tokio::io::AsyncReadExt;

        let path = self.artifact_path(hash, scope).await?;
        let (metadata, file) = {
            let _lock = self.lock_path(&path).await;
            let Some(metadata) = self.read_metadata(&path, hash.as_str()).await.optional()? else {
                return Ok(None);
            };
            let Some(file) = fs::File::open(&path)
                .await
                .map_err(|e| not_found(e, hash.as_str()))
                .optional()?
            else {
                return Ok(None);
            };
            (metadata, file)
        };

        let len = file.metadata().await?.len();
        if len != metadata.size {
            return Err(StorageError::InvalidMetadata(format!(
                "{hash}.json records {} bytes but body has {len}",
                metadata.size
            )));
        }

        let body = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Some(Artifact::new(metadata, Box::pin(body))))
    }

    #[instrument(skip(self, artifact), fields(backend = "local", size = artifact.metadata.size))]
    async fn put(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
        artifact: Artifact,
    ) -> StorageResult<()> {
        let path = self.artifact_path(hash, scope).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let Artifact { metadata, body } = artifact;
        let (temp, written) = write_temp(&path, body).await?;
        if written != metadata.size {
            remove_quietly(&temp).await;
            return Err(StorageError::SizeMismatch {
                expected: metadata.size,
                actual: written,
            });
        }

        let meta_path = metadata_path(&path);
        let meta_temp = match serde_json::to_vec_pretty(&metadata) {
            Ok(encoded) => {
                let encoded: ByteStream =
                    Box::pin(futures::stream::once(async move { Ok(Bytes::from(encoded)) }));
                write_temp(&meta_path, encoded).await
            }
            Err(e) => Err(StorageError::InvalidMetadata(e.to_string())),
        };
        let meta_temp = match meta_temp {
            Ok((meta_temp, _)) => meta_temp,
            Err(e) => {
                remove_quietly(&temp).await;
                return Err(e);
            }
        };

        let _lock = self.lock_path(&path).await;
        if let Err(e) = rename_into_place(&temp, &path).await {
            remove_quietly(&meta_temp).await;
            return Err(e);
        }
        if let Err(e) = rename_into_place(&meta_temp, &meta_path).await {
            // The new body must not outlive the failed swap next to stale metadata.
            remove_quietly(&meta_path).await;
            remove_quietly(&path).await;
            return Err(e);
        }

        tracing::debug!(hash = %hash, size = written, "Artifact stored");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {}", self.root.display()),
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::collect_body;
    use tempfile::tempdir;

    fn hash(s: &str) -> ArtifactHash {
        ArtifactHash::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::default();
        let metadata = ArtifactMetadata::new(5).with_duration_ms(120).with_tag("tag");

        backend
            .put(
                &hash("abc123"),
                &scope,
                Artifact::from_bytes(metadata.clone(), "hello"),
            )
            .await
            .unwrap();

        let artifact = backend.get(&hash("abc123"), &scope).await.unwrap().unwrap();
        assert_eq!(artifact.metadata, metadata);
        assert_eq!(collect_body(artifact.body).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_layout_on_disk() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::new(Some("team".to_string()), None);

        backend
            .put(
                &hash("ff00"),
                &scope,
                Artifact::from_bytes(ArtifactMetadata::default(), "x"),
            )
            .await
            .unwrap();

        let dir = temp.path().join("team").join("_");
        assert_eq!(std::fs::read(dir.join("ff00")).unwrap(), b"x");
        let meta: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("ff00.json")).unwrap()).unwrap();
        assert_eq!(meta, serde_json::json!({"size": 1}));

        // No temp files left behind.
        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| !n.contains(".tmp.")), "{names:?}");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_none() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::default();

        assert!(backend.head(&hash("dead"), &scope).await.unwrap().is_none());
        assert!(backend.get(&hash("dead"), &scope).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_size_mismatch_leaves_nothing() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::default();
        let body: ByteStream =
            Box::pin(futures::stream::once(async { Ok(Bytes::from_static(b"abc")) }));

        let err = backend
            .put(
                &hash("aa"),
                &scope,
                Artifact::new(ArtifactMetadata::new(10), body),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::SizeMismatch {
                expected: 10,
                actual: 3
            }
        ));

        assert!(backend.head(&hash("aa"), &scope).await.unwrap().is_none());
        let entries = std::fs::read_dir(temp.path().join("_").join("_")).unwrap();
        assert_eq!(entries.count(), 0);
    }

    #[tokio::test]
    async fn test_failed_body_stream_cleans_up() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::default();
        let body: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StorageError::Io(std::io::Error::other("client went away"))),
        ]));

        let result = backend
            .put(
                &hash("bb"),
                &scope,
                Artifact::new(ArtifactMetadata::new(100), body),
            )
            .await;
        assert!(matches!(result, Err(StorageError::Io(_))));

        let entries = std::fs::read_dir(temp.path().join("_").join("_")).unwrap();
        assert_eq!(entries.count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_error() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::default();
        let dir = temp.path().join("_").join("_");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("cafe"), b"body").unwrap();
        std::fs::write(dir.join("cafe.json"), b"{not json").unwrap();

        let err = backend.head(&hash("cafe"), &scope).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidMetadata(_)));
    }

    #[tokio::test]
    async fn test_sidecar_size_must_match_body() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::default();
        let dir = temp.path().join("_").join("_");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("beef"), vec![7u8; 1037]).unwrap();
        std::fs::write(dir.join("beef.json"), br#"{"size": 1000, "tag": "w0"}"#).unwrap();

        let err = backend.get(&hash("beef"), &scope).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidMetadata(_)));
    }

    #[tokio::test]
    async fn test_path_locks_released_after_use() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::default();

        backend
            .put(
                &hash("abcd"),
                &scope,
                Artifact::from_bytes(ArtifactMetadata::default(), "body"),
            )
            .await
            .unwrap();
        let artifact = backend.get(&hash("abcd"), &scope).await.unwrap().unwrap();
        assert_eq!(collect_body(artifact.body).await.unwrap(), "body");

        assert!(backend.locks.is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_scope_rejected() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let scope = ArtifactScope::team("..");

        let err = backend.head(&hash("ab"), &scope).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_scope_dir_rejected() {
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let root = temp.path().join("root");
        let backend = FilesystemBackend::new(&root).await.unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("escape")).unwrap();

        let err = backend
            .put(
                &hash("ab"),
                &ArtifactScope::team("escape"),
                Artifact::from_bytes(ArtifactMetadata::default(), "x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path().join("cache")).await.unwrap();
        backend.health_check().await.unwrap();

        std::fs::remove_dir(temp.path().join("cache")).unwrap();
        std::fs::write(temp.path().join("cache"), b"file").unwrap();
        assert!(backend.health_check().await.is_err());
    }
}
