//! Server test utilities.

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use trc_core::Config;
use trc_core::config::{AuthConfig, LoggingConfig, ServerConfig, StorageConfig};
use trc_server::{AppState, create_router};
use trc_storage::{ArtifactStore, FilesystemBackend};

/// Secret used by [`TestServer::new`].
pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub root_dir: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// JWT-authenticated server over temporary filesystem storage.
    pub async fn new() -> Self {
        Self::with_auth(AuthConfig::Jwt {
            secret: TEST_JWT_SECRET.to_string(),
        })
        .await
    }

    /// Server with a specific auth mode.
    pub async fn with_auth(auth: AuthConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let root_dir = temp_dir.path().join("artifacts");

        let storage: Arc<dyn ArtifactStore> = Arc::new(
            FilesystemBackend::new(&root_dir)
                .await
                .expect("Failed to create storage backend"),
        );

        let config = Config {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            auth,
            storage: StorageConfig::Local {
                root_dir: root_dir.clone(),
            },
        };

        let state = AppState::new(config, storage);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            root_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Direct access to the backing store.
    pub fn storage(&self) -> Arc<dyn ArtifactStore> {
        self.state.storage.clone()
    }
}
