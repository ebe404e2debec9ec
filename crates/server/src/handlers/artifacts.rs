//! Artifact endpoints of the remote cache protocol.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{parse_hash, read_json, scope_from_uri};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use trc_core::{ArtifactHash, ArtifactMetadata};
use trc_storage::{Artifact, StorageError};

/// Request/response header carrying the task duration in milliseconds.
pub const ARTIFACT_DURATION_HEADER: &str = "x-artifact-duration";
/// Request/response header carrying the client tag.
pub const ARTIFACT_TAG_HEADER: &str = "x-artifact-tag";

/// PUT response body.
#[derive(Debug, Serialize)]
pub struct PutArtifactResponse {
    pub urls: Vec<String>,
}

/// POST /artifacts request body.
#[derive(Debug, Deserialize)]
pub struct QueryArtifactsRequest {
    pub hashes: Vec<Value>,
}

/// Per-hash entry of the POST /artifacts response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub size: u64,
    pub task_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl From<ArtifactMetadata> for ArtifactInfo {
    fn from(metadata: ArtifactMetadata) -> Self {
        Self {
            size: metadata.size,
            task_duration_ms: metadata.duration_ms.unwrap_or(0),
            tag: metadata.tag.filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Response headers describing an artifact.
fn artifact_headers(metadata: &ArtifactMetadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(metadata.size));
    if let Some(duration) = metadata.duration_ms {
        headers.insert(ARTIFACT_DURATION_HEADER, HeaderValue::from(duration));
    }
    if let Some(tag) = metadata.tag.as_deref().filter(|t| !t.is_empty())
        && let Ok(value) = HeaderValue::from_str(tag)
    {
        headers.insert(ARTIFACT_TAG_HEADER, value);
    }
    headers
}

fn not_found() -> ApiError {
    ApiError::NotFound("Artifact not found".to_string())
}

/// Metadata declared by a PUT request's headers.
fn metadata_from_headers(headers: &HeaderMap) -> ApiResult<ArtifactMetadata> {
    let content_length = headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| ApiError::BadRequest("Missing Content-Length".to_string()))?;
    let size = content_length
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid Content-Length".to_string()))?;

    let mut metadata = ArtifactMetadata::new(size);

    if let Some(duration) = headers.get(ARTIFACT_DURATION_HEADER) {
        let duration = duration
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| ApiError::BadRequest("Invalid x-artifact-duration".to_string()))?;
        metadata = metadata.with_duration_ms(duration);
    }

    if let Some(tag) = headers
        .get(ARTIFACT_TAG_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
    {
        metadata = metadata.with_tag(tag);
    }

    Ok(metadata)
}

/// GET /artifacts/status
pub async fn artifacts_status() -> Json<StatusResponse> {
    Json(StatusResponse { status: "enabled" })
}

/// HEAD /artifacts/{hash}
pub async fn head_artifact(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    req: Request,
) -> ApiResult<Response> {
    let hash = parse_hash(&hash)?;
    let scope = scope_from_uri(req.uri())?;

    let metadata = state
        .storage
        .head(&hash, &scope)
        .await?
        .ok_or_else(not_found)?;

    Ok((StatusCode::OK, artifact_headers(&metadata)).into_response())
}

/// GET /artifacts/{hash}
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    req: Request,
) -> ApiResult<Response> {
    let hash = parse_hash(&hash)?;
    let scope = scope_from_uri(req.uri())?;

    let Artifact { metadata, body } = state
        .storage
        .get(&hash, &scope)
        .await?
        .ok_or_else(not_found)?;

    let mut headers = artifact_headers(&metadata);
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );

    let stream = body.map(move |chunk| {
        chunk.map_err(|e| {
            tracing::error!(hash = %hash, error = %e, "Artifact streaming failed mid-transfer");
            std::io::Error::other(e.to_string())
        })
    });

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

/// PUT /artifacts/{hash}
///
/// The body is streamed straight into storage; the stored size is the
/// declared `Content-Length`, which storage checks against the bytes received.
pub async fn put_artifact(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    req: Request,
) -> ApiResult<(StatusCode, Json<PutArtifactResponse>)> {
    let hash = parse_hash(&hash)?;
    let scope = scope_from_uri(req.uri())?;
    let metadata = metadata_from_headers(req.headers())?;
    let size = metadata.size;

    let body = req
        .into_body()
        .into_data_stream()
        .map_err(|e| StorageError::Io(std::io::Error::other(e)));

    state
        .storage
        .put(&hash, &scope, Artifact::new(metadata, Box::pin(body)))
        .await?;

    tracing::debug!(hash = %hash, size, "Artifact stored");

    Ok((StatusCode::ACCEPTED, Json(PutArtifactResponse { urls: Vec::new() })))
}

/// POST /artifacts
pub async fn query_artifacts(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<BTreeMap<String, Option<ArtifactInfo>>>> {
    let scope = scope_from_uri(req.uri())?;
    let request: QueryArtifactsRequest = read_json(req.into_body()).await?;

    let hashes = request
        .hashes
        .iter()
        .map(|value| {
            value
                .as_str()
                .and_then(|s| ArtifactHash::parse(s).ok())
                .ok_or_else(|| ApiError::BadRequest("Invalid artifact hashes".to_string()))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let found = state.storage.query(&hashes, &scope).await?;

    let response = found
        .into_iter()
        .map(|(hash, metadata)| (hash.to_string(), metadata.map(ArtifactInfo::from)))
        .collect();

    Ok(Json(response))
}
