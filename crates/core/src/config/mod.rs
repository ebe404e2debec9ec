//! Layered configuration resolution.
//!
//! A config document (YAML, JSON or TOML) is parsed, `$VAR` placeholders are
//! substituted, `TRC_*` overrides are layered on top, and the merged tree is
//! validated into a frozen [`Config`]. The process environment is never read
//! here; callers pass it in as a map.

mod interpolate;
mod overrides;
mod schema;
mod source;

pub use overrides::ENV_OVERRIDES;
pub use source::{ConfigFormat, ConfigSource};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Placeholder written in place of secrets when a config is printed.
pub const REDACTED: &str = "[redacted]";

/// A single config problem at a dotted path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    pub path: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Startup-time configuration failure with every issue found.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConfigError {
    pub message: String,
    pub issues: Vec<ConfigIssue>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>, issues: Vec<ConfigIssue>) -> Self {
        Self {
            message: message.into(),
            issues,
        }
    }
}

/// Fully resolved process configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding a listener.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    Silent,
}

impl LogLevel {
    pub const ALL: [LogLevel; 7] = [
        Self::Fatal,
        Self::Error,
        Self::Warn,
        Self::Info,
        Self::Debug,
        Self::Trace,
        Self::Silent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Silent => "silent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == s)
    }

    /// Equivalent `tracing` filter directive.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Fatal | Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Silent => "off",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Human-readable output; `None` lets the runtime decide.
    pub pretty: Option<bool>,
    /// Additional JSON log file.
    pub file: Option<PathBuf>,
}

/// Credential verification mode.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    Jwt { secret: String },
    SharedSecret { secret: String },
}

impl AuthConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Jwt { .. } => "jwt",
            Self::SharedSecret { .. } => "shared-secret",
        }
    }
}

// Secrets stay out of logs and panics.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwt { .. } => f.debug_struct("Jwt").field("secret", &REDACTED).finish(),
            Self::SharedSecret { .. } => f
                .debug_struct("SharedSecret")
                .field("secret", &REDACTED)
                .finish(),
        }
    }
}

/// Storage backend selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    /// Local filesystem storage.
    Local { root_dir: PathBuf },
    /// S3-compatible object storage.
    S3(S3Config),
}

impl StorageConfig {
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::S3(_) => "s3",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Optional endpoint URL (for MinIO, etc.). A missing scheme means `http://`.
    pub endpoint: Option<String>,
    /// Optional key prefix inside the bucket.
    pub prefix: Option<String>,
    /// Static credentials. `None` uses the default AWS credential chain.
    pub credentials: Option<S3Credentials>,
    /// Path-style addressing (`endpoint/bucket/key`), required by MinIO.
    pub force_path_style: bool,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            prefix: None,
            credentials: None,
            force_path_style: false,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &REDACTED)
            .finish()
    }
}

/// Resolve a config from optional raw contents and an environment map.
///
/// Order: parse, interpolate placeholders, apply `TRC_*` overrides, infer the
/// storage provider and auth type, validate.
pub fn resolve(
    source: Option<&ConfigSource>,
    env: &HashMap<String, String>,
) -> Result<Config, ConfigError> {
    let mut tree = match source {
        Some(source) => source.parse()?,
        None => Value::Object(Map::new()),
    };

    let issues = interpolate::interpolate(&mut tree, env);
    if !issues.is_empty() {
        return Err(ConfigError::new(
            "Unable to resolve environment variables in config",
            issues,
        ));
    }

    let merged = overrides::apply(tree, env)?;
    schema::validate(&merged)
}

impl Config {
    /// Canonical camelCase document for this config, optionally with secrets
    /// replaced by [`REDACTED`].
    pub fn to_document(&self, redact: bool) -> Value {
        let secret = |s: &str| {
            if redact {
                REDACTED.to_string()
            } else {
                s.to_string()
            }
        };

        let mut logging = json!({ "level": self.logging.level.as_str() });
        if let Some(pretty) = self.logging.pretty {
            logging["pretty"] = json!(pretty);
        }
        if let Some(file) = &self.logging.file {
            logging["file"] = json!(file.display().to_string());
        }

        let auth = match &self.auth {
            AuthConfig::Jwt { secret: s } => json!({
                "type": "jwt",
                "jwt": { "secret": secret(s) },
            }),
            AuthConfig::SharedSecret { secret: s } => json!({
                "type": "shared-secret",
                "sharedSecret": { "secret": secret(s) },
            }),
        };

        let storage = match &self.storage {
            StorageConfig::Local { root_dir } => json!({
                "provider": "local",
                "local": { "rootDir": root_dir.display().to_string() },
            }),
            StorageConfig::S3(s3) => {
                let mut doc = json!({
                    "bucket": s3.bucket,
                    "region": s3.region,
                    "forcePathStyle": s3.force_path_style,
                });
                if let Some(endpoint) = &s3.endpoint {
                    doc["endpoint"] = json!(endpoint);
                }
                if let Some(prefix) = &s3.prefix {
                    doc["prefix"] = json!(prefix);
                }
                if let Some(credentials) = &s3.credentials {
                    doc["accessKeyId"] = json!(credentials.access_key_id);
                    doc["secretAccessKey"] = json!(secret(&credentials.secret_access_key));
                }
                json!({ "provider": "s3", "s3": doc })
            }
        };

        json!({
            "server": { "host": self.server.host, "port": self.server.port },
            "logging": logging,
            "auth": auth,
            "storage": storage,
        })
    }
}
