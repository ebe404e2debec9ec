//! HTTP server for the TRC remote build cache.
//!
//! This crate provides:
//! - The bearer-credential auth gate (JWT or shared secret)
//! - Artifact routes: HEAD/GET/PUT by hash, batch query, events, status
//! - Request tracing and logging setup
//! - Config input selection for the `trc` binary

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod state;
pub mod trace;

pub use auth::{AuthFailure, Authenticator};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
pub use trace::TraceId;
