//! S3-compatible storage backend using AWS SDK.
//!
//! Each artifact is one object at `[prefix/]team/slug/hash`. Metadata travels
//! as user-defined object metadata (`size`, `durationms`, `tag`).

use crate::error::{OptionalExt, StorageError, StorageResult};
use crate::traits::{Artifact, ArtifactStore, collect_body};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use tracing::instrument;
use trc_core::config::S3Config;
use trc_core::{ArtifactHash, ArtifactMetadata, ArtifactScope};

const META_SIZE: &str = "size";
const META_DURATION: &str = "durationms";
const META_DURATION_ALT: &str = "durationMs";
const META_TAG: &str = "tag";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Marker carried by lazy-credentials errors so they surface as config errors.
const CREDENTIALS_ERROR_MARKER: &str = "trc-s3-default-credentials";

/// Builds the AWS default credentials chain on first signed request instead of
/// at construction time.
#[derive(Debug)]
struct LazyDefaultCredentialsProvider {
    region: String,
    chain: OnceCell<aws_config::default_provider::credentials::DefaultCredentialsChain>,
}

impl LazyDefaultCredentialsProvider {
    fn new(region: String) -> Self {
        Self {
            region,
            chain: OnceCell::new(),
        }
    }

    async fn credentials(&self) -> aws_credential_types::provider::Result {
        let chain = self
            .chain
            .get_or_init(|| async {
                aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                    .region(aws_config::Region::new(self.region.clone()))
                    .build()
                    .await
            })
            .await;

        chain.provide_credentials().await.map_err(|err| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_ERROR_MARKER}: default AWS credentials resolution failed: {err}"
            ))
        })
    }
}

impl ProvideCredentials for LazyDefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.credentials())
    }
}

/// Whether a failed object read means "no such object".
///
/// A missing bucket also answers 404 but is a backend fault, not an absent
/// artifact.
pub fn is_missing_object(status: Option<u16>, code: Option<&str>) -> bool {
    match code {
        Some("NoSuchBucket") => false,
        Some("NotFound" | "NoSuchKey") => true,
        _ => status == Some(404),
    }
}

/// Whether a failed bucket probe means the bucket does not exist.
pub fn is_missing_bucket(status: Option<u16>, code: Option<&str>) -> bool {
    status == Some(404) || code == Some("NoSuchBucket")
}

fn error_signal<E>(err: &SdkError<E>) -> (Option<u16>, Option<&str>)
where
    E: ProvideErrorMetadata,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.as_service_error().and_then(|e| e.code());
    (status, code)
}

/// Convert an `HeadObject`/`GetObject` error; a missing object becomes
/// `NotFound`.
fn map_read_error<E>(err: SdkError<E>, key: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let (status, code) = error_signal(&err);
    if is_missing_object(status, code) {
        return StorageError::NotFound(key.to_string());
    }
    map_sdk_error(err)
}

/// Convert an SDK error into a backend or credentials failure.
fn map_sdk_error<E>(err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if err.to_string().contains(CREDENTIALS_ERROR_MARKER) {
        return StorageError::Config(
            "S3 credential resolution failed. Configure accessKeyId/secretAccessKey or make ambient AWS credentials available."
                .to_string(),
        );
    }

    StorageError::Backend(Box::new(err))
}

/// Object metadata map for an artifact.
pub fn encode_metadata(metadata: &ArtifactMetadata) -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert(META_SIZE.to_string(), metadata.size.to_string());
    if let Some(duration) = metadata.duration_ms {
        map.insert(META_DURATION.to_string(), duration.to_string());
    }
    if let Some(tag) = metadata.tag.as_deref().filter(|t| !t.is_empty()) {
        map.insert(META_TAG.to_string(), tag.to_string());
    }
    map
}

/// Rebuild artifact metadata from object metadata.
///
/// A missing or unparseable `size` falls back to the transport content
/// length. A malformed duration is an error.
pub fn decode_metadata(
    map: Option<&HashMap<String, String>>,
    content_length: Option<i64>,
) -> StorageResult<ArtifactMetadata> {
    let get = |key: &str| map.and_then(|m| m.get(key)).map(String::as_str);

    let size = get(META_SIZE)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .or_else(|| content_length.and_then(|len| u64::try_from(len).ok()))
        .ok_or_else(|| {
            StorageError::InvalidMetadata("object has neither size metadata nor content length".to_string())
        })?;

    let duration_ms = match get(META_DURATION).or_else(|| get(META_DURATION_ALT)) {
        Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
            StorageError::InvalidMetadata(format!("invalid {META_DURATION}: {raw:?}"))
        })?),
        None => None,
    };

    let tag = get(META_TAG).filter(|t| !t.is_empty()).map(str::to_string);

    Ok(ArtifactMetadata {
        size,
        duration_ms,
        tag,
    })
}

/// S3-compatible artifact store.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    endpoint: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Bare `host:port` endpoints get an `http://` scheme.
fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

impl S3Backend {
    /// Create a new S3 backend. No network I/O happens here.
    pub async fn new(config: &S3Config) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("s3 bucket must not be empty".to_string()));
        }

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        builder = match &config.credentials {
            Some(credentials) => builder.credentials_provider(aws_sdk_s3::config::Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                None,
                None,
                "trc-config",
            )),
            None => builder.credentials_provider(LazyDefaultCredentialsProvider::new(
                config.region.clone(),
            )),
        };

        let endpoint = config.endpoint.as_deref().map(normalize_endpoint);
        if let Some(endpoint) = &endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let prefix = config
            .prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix,
            endpoint,
        })
    }

    /// Object key for an artifact, with the configured prefix applied.
    fn object_key(&self, hash: &ArtifactHash, scope: &ArtifactScope) -> StorageResult<String> {
        let key = scope.object_key(hash)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key,
        })
    }
}

#[async_trait]
impl ArtifactStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
    ) -> StorageResult<Option<ArtifactMetadata>> {
        let key = self.object_key(hash, scope)?;
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| map_read_error(e, &key))
            .optional()?;

        output
            .map(|o| decode_metadata(o.metadata(), o.content_length()))
            .transpose()
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
    ) -> StorageResult<Option<Artifact>> {
        let key = self.object_key(hash, scope)?;
        let Some(output) = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| map_read_error(e, &key))
            .optional()?
        else {
            return Ok(None);
        };

        let metadata = decode_metadata(output.metadata(), output.content_length())?;
        let body = ReaderStream::new(output.body.into_async_read())
            .map(|chunk| chunk.map_err(StorageError::Io));

        Ok(Some(Artifact::new(metadata, Box::pin(body))))
    }

    /// Buffers the whole body: `PutObject` needs the length up front.
    #[instrument(skip(self, artifact), fields(backend = "s3", size = artifact.metadata.size))]
    async fn put(
        &self,
        hash: &ArtifactHash,
        scope: &ArtifactScope,
        artifact: Artifact,
    ) -> StorageResult<()> {
        let key = self.object_key(hash, scope)?;
        let Artifact { metadata, body } = artifact;
        let data = collect_body(body).await?;

        let actual = data.len() as u64;
        if actual != metadata.size {
            return Err(StorageError::SizeMismatch {
                expected: metadata.size,
                actual,
            });
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/octet-stream")
            .content_length(actual as i64)
            .set_metadata(Some(encode_metadata(&metadata)))
            .body(data.into())
            .send()
            .await
            .map_err(map_sdk_error)?;

        tracing::debug!(key = %key, size = actual, "Artifact stored");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let head_bucket = async {
            self.client
                .head_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| {
                    let (status, code) = error_signal(&e);
                    if is_missing_bucket(status, code) {
                        StorageError::Config(format!("bucket does not exist: {}", self.bucket))
                    } else {
                        map_sdk_error(e)
                    }
                })
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, head_bucket)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "S3 health check timed out after 10 seconds",
                ))
            })??;
        Ok(())
    }
}
