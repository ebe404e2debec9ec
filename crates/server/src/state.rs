//! Application state.

use crate::auth::Authenticator;
use std::sync::Arc;
use trc_core::Config;
use trc_storage::ArtifactStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Artifact storage backend.
    pub storage: Arc<dyn ArtifactStore>,
    /// Bearer credential verifier.
    pub auth: Arc<Authenticator>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: Config, storage: Arc<dyn ArtifactStore>) -> Self {
        let auth = Authenticator::from_config(&config.auth);
        Self {
            config: Arc::new(config),
            storage,
            auth: Arc::new(auth),
        }
    }
}
