//! Typed validation of the merged config tree.
//!
//! Every rule records an issue and keeps going, so a single run reports all
//! problems at once.

use super::{
    AuthConfig, Config, ConfigError, ConfigIssue, LogLevel, LoggingConfig, S3Config,
    S3Credentials, ServerConfig, StorageConfig, default_host, default_port,
};
use serde_json::{Map, Value};
use std::path::PathBuf;

const STORAGE_PROVIDERS: &[&str] = &["local", "s3"];
const AUTH_TYPES: &[&str] = &["jwt", "shared-secret"];

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A mapping at a dotted path. Absent and mistyped sections read as empty.
struct Section<'a> {
    path: String,
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Section<'a> {
    fn child_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map?.get(key).filter(|v| !v.is_null())
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

#[derive(Default)]
struct Validator {
    issues: Vec<ConfigIssue>,
}

impl Validator {
    fn issue(&mut self, path: String, message: impl Into<String>) {
        self.issues.push(ConfigIssue::new(path, message));
    }

    fn section<'a>(&mut self, parent: &Section<'a>, key: &str) -> Section<'a> {
        let path = parent.child_path(key);
        let map = match parent.get(key) {
            None => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                self.issue(
                    path.clone(),
                    format!("Expected object, received {}", kind(other)),
                );
                None
            }
        };
        Section { path, map }
    }

    fn string(&mut self, section: &Section<'_>, key: &str) -> Option<String> {
        match section.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => {
                self.issue(
                    section.child_path(key),
                    format!("Expected string, received {}", kind(other)),
                );
                None
            }
        }
    }

    fn required_string(&mut self, section: &Section<'_>, key: &str) -> Option<String> {
        if !section.has(key) {
            self.issue(section.child_path(key), "Required");
            return None;
        }
        let value = self.string(section, key)?;
        if value.is_empty() {
            self.issue(
                section.child_path(key),
                "String must contain at least 1 character(s)",
            );
            return None;
        }
        Some(value)
    }

    /// Optional string that must be non-empty when present.
    fn non_empty_string(&mut self, section: &Section<'_>, key: &str) -> Option<String> {
        if !section.has(key) {
            return None;
        }
        self.required_string(section, key)
    }

    fn boolean(&mut self, section: &Section<'_>, key: &str) -> Option<bool> {
        let value = section.get(key)?;
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            self.issue(
                section.child_path(key),
                format!("Expected boolean, received {}", kind(value)),
            );
        }
        parsed
    }

    fn port(&mut self, section: &Section<'_>, key: &str) -> Option<u16> {
        let path = section.child_path(key);
        let value = section.get(key)?;
        let number = match value {
            Value::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .map(Ok)
                .or_else(|| n.as_f64().map(Err)),
            Value::String(s) => s.trim().parse::<i64>().ok().map(|n| Ok(i128::from(n))),
            _ => None,
        };

        match number {
            None => {
                self.issue(path, format!("Expected number, received {}", kind(value)));
                None
            }
            Some(Err(_)) => {
                self.issue(path, "Expected integer, received float");
                None
            }
            Some(Ok(n)) if n < 1 => {
                self.issue(path, "Number must be greater than or equal to 1");
                None
            }
            Some(Ok(n)) => match u16::try_from(n) {
                Ok(port) => Some(port),
                Err(_) => {
                    self.issue(path, "Number must be less than or equal to 65535");
                    None
                }
            },
        }
    }

    fn one_of(&mut self, section: &Section<'_>, key: &str, allowed: &[&str]) -> Option<String> {
        let value = self.string(section, key)?;
        if allowed.contains(&value.as_str()) {
            return Some(value);
        }
        let expected = allowed
            .iter()
            .map(|v| format!("'{v}'"))
            .collect::<Vec<_>>()
            .join(" | ");
        self.issue(
            section.child_path(key),
            format!("Invalid enum value. Expected {expected}, received '{value}'"),
        );
        None
    }

    /// Explicit discriminator, or one inferred from which sections are present.
    fn discriminator(
        &mut self,
        section: &Section<'_>,
        key: &str,
        allowed: &[&str],
        candidates: &[(&str, &str)],
    ) -> Option<String> {
        if section.has(key) {
            return self.one_of(section, key, allowed);
        }

        let present: Vec<&str> = candidates
            .iter()
            .filter(|(sub, _)| section.has(sub))
            .map(|(_, value)| *value)
            .collect();
        match present.as_slice() {
            [single] => Some(single.to_string()),
            [] => {
                self.issue(section.child_path(key), "Required");
                None
            }
            _ => {
                let names = candidates
                    .iter()
                    .map(|(sub, _)| format!("{}.{sub}", section.path))
                    .collect::<Vec<_>>()
                    .join(" and ");
                self.issue(
                    section.child_path(key),
                    format!("Both {names} are set; specify {key} explicitly"),
                );
                None
            }
        }
    }

    fn endpoint(&mut self, section: &Section<'_>, key: &str) -> Option<String> {
        let raw = self.non_empty_string(section, key)?;
        let normalized = if raw.contains("://") {
            raw.clone()
        } else {
            format!("http://{raw}")
        };
        match url::Url::parse(&normalized) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Some(raw),
            _ => {
                self.issue(section.child_path(key), "Invalid url");
                None
            }
        }
    }
}

pub(crate) fn validate(tree: &Value) -> Result<Config, ConfigError> {
    let mut v = Validator::default();
    let root = Section {
        path: String::new(),
        map: tree.as_object(),
    };

    let server = server(&mut v, &root);
    let logging = logging(&mut v, &root);
    let auth = auth(&mut v, &root);
    let storage = storage(&mut v, &root);

    match (server, logging, auth, storage) {
        (Some(server), Some(logging), Some(auth), Some(storage)) if v.issues.is_empty() => {
            Ok(Config {
                server,
                logging,
                auth,
                storage,
            })
        }
        _ => Err(ConfigError::new("Invalid config", v.issues)),
    }
}

fn server(v: &mut Validator, root: &Section<'_>) -> Option<ServerConfig> {
    let section = v.section(root, "server");
    let host = v.string(&section, "host");
    let has_port = section.has("port");
    let port = v.port(&section, "port");

    if has_port && port.is_none() {
        return None;
    }
    Some(ServerConfig {
        host: host.unwrap_or_else(default_host),
        port: port.unwrap_or_else(default_port),
    })
}

fn logging(v: &mut Validator, root: &Section<'_>) -> Option<LoggingConfig> {
    let section = v.section(root, "logging");
    let level = if section.has("level") {
        let names: Vec<&str> = LogLevel::ALL.iter().map(|l| l.as_str()).collect();
        let level = v.one_of(&section, "level", &names)?;
        LogLevel::parse(&level)?
    } else {
        LogLevel::default()
    };
    let pretty = v.boolean(&section, "pretty");
    let file = v.non_empty_string(&section, "file").map(PathBuf::from);

    Some(LoggingConfig {
        level,
        pretty,
        file,
    })
}

fn auth(v: &mut Validator, root: &Section<'_>) -> Option<AuthConfig> {
    let section = v.section(root, "auth");
    let kind = v.discriminator(
        &section,
        "type",
        AUTH_TYPES,
        &[("jwt", "jwt"), ("sharedSecret", "shared-secret")],
    )?;

    match kind.as_str() {
        "jwt" => {
            let jwt = v.section(&section, "jwt");
            let secret = v.required_string(&jwt, "secret")?;
            Some(AuthConfig::Jwt { secret })
        }
        _ => {
            let shared = v.section(&section, "sharedSecret");
            let secret = v.required_string(&shared, "secret")?;
            Some(AuthConfig::SharedSecret { secret })
        }
    }
}

fn storage(v: &mut Validator, root: &Section<'_>) -> Option<StorageConfig> {
    let section = v.section(root, "storage");
    let provider = v.discriminator(
        &section,
        "provider",
        STORAGE_PROVIDERS,
        &[("local", "local"), ("s3", "s3")],
    )?;

    match provider.as_str() {
        "local" => {
            let local = v.section(&section, "local");
            let root_dir = v.required_string(&local, "rootDir")?;
            Some(StorageConfig::Local {
                root_dir: PathBuf::from(root_dir),
            })
        }
        _ => s3(v, &section).map(StorageConfig::S3),
    }
}

fn s3(v: &mut Validator, storage: &Section<'_>) -> Option<S3Config> {
    let section = v.section(storage, "s3");
    let bucket = v.required_string(&section, "bucket");
    let region = v.required_string(&section, "region");
    let endpoint = v.endpoint(&section, "endpoint");
    let prefix = v.string(&section, "prefix").filter(|p| !p.is_empty());
    let access_key_id = v.non_empty_string(&section, "accessKeyId");
    let secret_access_key = v.non_empty_string(&section, "secretAccessKey");
    let force_path_style = v.boolean(&section, "forcePathStyle").unwrap_or(false);

    let credentials = match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Some(S3Credentials {
            access_key_id,
            secret_access_key,
        }),
        (None, None) => None,
        (Some(_), None) => {
            v.issue(
                section.child_path("secretAccessKey"),
                "Required when accessKeyId is set",
            );
            None
        }
        (None, Some(_)) => {
            v.issue(
                section.child_path("accessKeyId"),
                "Required when secretAccessKey is set",
            );
            None
        }
    };

    Some(S3Config {
        bucket: bucket?,
        region: region?,
        endpoint,
        prefix,
        credentials,
        force_path_style,
    })
}
