//! Config input selection and loading for the `trc` binary.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use trc_core::config::{ConfigSource, resolve};
use trc_core::{Config, ConfigError, ConfigIssue};

/// Config file used when neither the environment nor the CLI names one.
pub const DEFAULT_CONFIG_PATH: &str = "./trc.yaml";

/// Where the raw config comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigInput {
    /// Contents of `TRC_CONFIG`.
    Raw(String),
    /// A file path. `explicit` is false only for [`DEFAULT_CONFIG_PATH`].
    Path { path: PathBuf, explicit: bool },
}

/// Selected input plus warnings about ignored alternatives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConfigInput {
    pub input: ConfigInput,
    pub warnings: Vec<String>,
}

/// Pick the config input. Precedence: `TRC_CONFIG`, `TRC_CONFIG_PATH`,
/// `--config`, then the default path.
pub fn resolve_config_input(
    cli_config: Option<&Path>,
    env: &HashMap<String, String>,
) -> ResolvedConfigInput {
    let non_empty = |key: &str| env.get(key).filter(|v| !v.is_empty());
    let mut warnings = Vec::new();

    if let Some(raw) = non_empty("TRC_CONFIG") {
        if non_empty("TRC_CONFIG_PATH").is_some() {
            warnings.push("Warning: TRC_CONFIG is set; ignoring TRC_CONFIG_PATH".to_string());
        }
        if cli_config.is_some() {
            warnings.push("Warning: TRC_CONFIG is set; ignoring --config".to_string());
        }
        return ResolvedConfigInput {
            input: ConfigInput::Raw(raw.clone()),
            warnings,
        };
    }

    if let Some(path) = non_empty("TRC_CONFIG_PATH") {
        if cli_config.is_some() {
            warnings.push("Warning: TRC_CONFIG_PATH is set; ignoring --config".to_string());
        }
        return ResolvedConfigInput {
            input: ConfigInput::Path {
                path: PathBuf::from(path),
                explicit: true,
            },
            warnings,
        };
    }

    let input = match cli_config {
        Some(path) => ConfigInput::Path {
            path: path.to_path_buf(),
            explicit: true,
        },
        None => ConfigInput::Path {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            explicit: false,
        },
    };
    ResolvedConfigInput { input, warnings }
}

/// Read the selected input and resolve it against `env`.
///
/// A missing default file means env-only configuration; any other read
/// failure is a config error at `(file)`.
pub fn load_config(input: &ConfigInput, env: &HashMap<String, String>) -> Result<Config, ConfigError> {
    match input {
        ConfigInput::Raw(raw) => resolve(Some(&ConfigSource::new(raw.as_str())), env),
        ConfigInput::Path { path, explicit } => match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::debug!(config_path = %path.display(), "Loading configuration from file");
                resolve(Some(&ConfigSource::from_file_contents(path, contents)), env)
            }
            Err(err) if err.kind() == ErrorKind::NotFound && !explicit => {
                tracing::debug!(config_path = %path.display(), "No config file found, using environment");
                resolve(None, env)
            }
            Err(err) => Err(ConfigError::new(
                format!("Unable to read config file: {}", path.display()),
                vec![ConfigIssue::new("(file)", err.to_string())],
            )),
        },
    }
}
