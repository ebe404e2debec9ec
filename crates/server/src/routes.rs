//! Route configuration.

use crate::auth::auth_middleware;
use crate::error::ApiError;
use crate::handlers;
use crate::state::AppState;
use crate::trace::trace_layer;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

/// Prefix under which the artifact routes are mounted a second time.
pub const VERSION_PREFIX: &str = "/v8";

/// Artifact and event routes, relative to a mount point.
fn artifact_routes() -> Router<AppState> {
    Router::new()
        .route("/artifacts/status", get(handlers::artifacts_status))
        .route("/artifacts/events", post(handlers::record_events))
        .route(
            "/artifacts/{hash}",
            get(handlers::get_artifact)
                .head(handlers::head_artifact)
                .put(handlers::put_artifact),
        )
        .route("/artifacts", post(handlers::query_artifacts))
}

async fn route_not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(artifact_routes())
        .nest(VERSION_PREFIX, artifact_routes())
        .fallback(route_not_found)
        // Layers apply outermost-last: trace span -> auth -> handler.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(trace_layer())
        .with_state(state)
}
