//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::body::{Body, Bytes};
use axum::extract::Query;
use axum::http::Uri;
use serde::de::DeserializeOwned;
use trc_core::{ArtifactHash, ArtifactScope};

/// Maximum size of a JSON request body.
pub const MAX_JSON_BODY_SIZE: usize = 1024 * 1024;

/// Parse a path hash, rejecting anything that is not non-empty hex.
pub fn parse_hash(raw: &str) -> ApiResult<ArtifactHash> {
    ArtifactHash::parse(raw).map_err(|_| ApiError::BadRequest("Invalid artifact hash".to_string()))
}

/// Read the `(teamId, slug)` scope from the query string.
pub fn scope_from_uri(uri: &Uri) -> ApiResult<ArtifactScope> {
    let invalid = || ApiError::BadRequest("Invalid scope".to_string());
    let Query(scope) = Query::<ArtifactScope>::try_from_uri(uri).map_err(|_| invalid())?;
    scope.validate().map_err(|_| invalid())?;
    Ok(scope)
}

/// Buffer a small request body.
pub async fn read_body(body: Body) -> ApiResult<Bytes> {
    axum::body::to_bytes(body, MAX_JSON_BODY_SIZE)
        .await
        .map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))
}

/// Buffer and decode a JSON request body.
pub async fn read_json<T: DeserializeOwned>(body: Body) -> ApiResult<T> {
    let bytes = read_body(body).await?;
    serde_json::from_slice(&bytes)
        .map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))
}
