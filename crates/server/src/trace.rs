//! Request tracing: per-request span and response log line.

use axum::http::{HeaderMap, Request, Response};
use std::time::Duration;
use tower_http::trace::{DefaultOnRequest, HttpMakeClassifier, MakeSpan, OnResponse, TraceLayer};
use tracing::Span;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer client values are truncated to keep log lines bounded.
const MAX_TRACE_ID_LEN: usize = 128;

/// Header carrying a client-supplied trace ID.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Trace ID for request correlation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// Truncated to [`MAX_TRACE_ID_LEN`] characters, then stripped of anything
    /// that is not printable ASCII.
    pub fn from_client(value: &str) -> Self {
        // Count chars, not bytes, so multi-byte input cannot split a boundary.
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Take the trace ID from request headers, or generate one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Self::from_client)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opens the `request` span with method, path, and trace ID.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let trace_id = TraceId::from_headers(request.headers());
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            trace_id = %trace_id,
        )
    }
}

/// Logs every response at info with status and latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseLog;

impl<B> OnResponse<B> for ResponseLog {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = latency.as_millis() as u64,
            "request"
        );
    }
}

pub type HttpTraceLayer = TraceLayer<HttpMakeClassifier, RequestSpan, DefaultOnRequest, ResponseLog>;

/// The HTTP trace layer used by the router.
pub fn trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_response(ResponseLog)
}
