//! Raw config document parsing.

use super::{ConfigError, ConfigIssue};
use figment::providers::{Format, Json, Toml, Yaml};
use serde_json::{Map, Value};
use std::path::Path;

/// Serialization format of a config document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format implied by a file extension, if recognized.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Sniff the format from content: a leading `{` or `[` is JSON, anything
    /// else is treated as YAML.
    pub fn detect(contents: &str) -> Self {
        match contents.trim_start().chars().next() {
            Some('{' | '[') => Self::Json,
            _ => Self::Yaml,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Yaml => "YAML",
            Self::Json => "JSON",
            Self::Toml => "TOML",
        }
    }

    fn issue_path(self) -> &'static str {
        match self {
            Self::Yaml => "(yaml)",
            Self::Json => "(json)",
            Self::Toml => "(toml)",
        }
    }
}

/// Raw config contents plus an optional format hint.
#[derive(Clone, Debug)]
pub struct ConfigSource {
    pub contents: String,
    pub format: Option<ConfigFormat>,
}

impl ConfigSource {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: ConfigFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Config source whose format hint comes from the file extension.
    pub fn from_file_contents(path: &Path, contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            format: ConfigFormat::from_path(path),
        }
    }

    /// Explicit hint, falling back to content sniffing.
    pub fn format(&self) -> ConfigFormat {
        self.format
            .unwrap_or_else(|| ConfigFormat::detect(&self.contents))
    }

    /// Parse into a generic document tree whose top level is a mapping.
    pub(crate) fn parse(&self) -> Result<Value, ConfigError> {
        if self.contents.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        let format = self.format();
        let parsed: Result<Value, String> = match format {
            ConfigFormat::Yaml => Yaml::from_str(&self.contents).map_err(|e| e.to_string()),
            ConfigFormat::Json => Json::from_str(&self.contents).map_err(|e| e.to_string()),
            ConfigFormat::Toml => Toml::from_str(&self.contents).map_err(|e| e.to_string()),
        };

        match parsed {
            Ok(Value::Object(map)) => Ok(Value::Object(map)),
            // A YAML document holding only comments parses as null.
            Ok(Value::Null) => Ok(Value::Object(Map::new())),
            Ok(other) => Err(ConfigError::new(
                "Invalid config",
                vec![ConfigIssue::new(
                    "(root)",
                    format!("Expected object, received {}", super::schema::kind(&other)),
                )],
            )),
            Err(message) => Err(ConfigError::new(
                format!("Invalid {} in config", format.name()),
                vec![ConfigIssue::new(format.issue_path(), message)],
            )),
        }
    }
}
