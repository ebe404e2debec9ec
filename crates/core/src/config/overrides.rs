//! Direct environment variable overrides.

use super::{ConfigError, ConfigIssue};
use figment::Figment;
use figment::providers::Serialized;
use serde_json::Value;
use std::collections::HashMap;

/// Environment variables that override a single config path.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("TRC_HOST", "server.host"),
    ("TRC_PORT", "server.port"),
    ("TRC_LOG_LEVEL", "logging.level"),
    ("TRC_LOG_PRETTY", "logging.pretty"),
    ("TRC_LOG_FILE", "logging.file"),
    ("TRC_AUTH_TYPE", "auth.type"),
    ("TRC_JWT_SECRET", "auth.jwt.secret"),
    ("TRC_SHARED_SECRET", "auth.sharedSecret.secret"),
    ("TRC_STORAGE_PROVIDER", "storage.provider"),
    ("TRC_LOCAL_ROOT_DIR", "storage.local.rootDir"),
    ("TRC_S3_BUCKET", "storage.s3.bucket"),
    ("TRC_S3_REGION", "storage.s3.region"),
    ("TRC_S3_ENDPOINT", "storage.s3.endpoint"),
    ("TRC_S3_PREFIX", "storage.s3.prefix"),
    ("TRC_S3_ACCESS_KEY_ID", "storage.s3.accessKeyId"),
    ("TRC_S3_SECRET_ACCESS_KEY", "storage.s3.secretAccessKey"),
    ("TRC_S3_FORCE_PATH_STYLE", "storage.s3.forcePathStyle"),
];

/// Layer non-empty override variables on top of the document tree.
///
/// Values are merged as strings; typed coercion happens during validation.
pub(crate) fn apply(tree: Value, env: &HashMap<String, String>) -> Result<Value, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(tree));
    for (var, path) in ENV_OVERRIDES {
        if let Some(value) = env.get(*var).filter(|v| !v.is_empty()) {
            figment = figment.merge(Serialized::default(path, value.as_str()));
        }
    }

    figment.extract::<Value>().map_err(|e| {
        ConfigError::new(
            "Invalid config",
            vec![ConfigIssue::new("(root)", e.to_string())],
        )
    })
}
