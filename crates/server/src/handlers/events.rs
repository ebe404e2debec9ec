//! Cache usage events. Validated, then discarded.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::read_json;
use axum::extract::Request;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use trc_core::is_valid_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Hit,
    Miss,
}

/// One cache event as reported by the build orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEvent {
    pub session_id: String,
    pub source: EventSource,
    pub event: EventKind,
    pub hash: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl CacheEvent {
    fn from_value(value: Value) -> Option<Self> {
        let event: Self = serde_json::from_value(value).ok()?;
        let duration_ok = event.duration.is_none_or(|d| d.is_finite() && d >= 0.0);
        (is_valid_hash(&event.hash) && duration_ok).then_some(event)
    }
}

/// POST /artifacts/events
pub async fn record_events(req: Request) -> ApiResult<StatusCode> {
    let payload: Value = read_json(req.into_body()).await?;
    let Value::Array(items) = payload else {
        return Err(ApiError::BadRequest("Invalid request body".to_string()));
    };

    let events = items
        .into_iter()
        .map(CacheEvent::from_value)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ApiError::BadRequest("Invalid cache events".to_string()))?;

    let hits = events.iter().filter(|e| e.event == EventKind::Hit).count();
    tracing::debug!(count = events.len(), hits, "Cache events received");

    Ok(StatusCode::OK)
}
