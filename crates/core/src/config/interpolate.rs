//! `$NAME` / `${NAME}` placeholder substitution.

use super::ConfigIssue;
use serde_json::Value;
use std::collections::HashMap;

/// Replace every string value that is exactly a placeholder with the named
/// variable from `env`. Strings that merely contain a `$` are left alone.
pub(crate) fn interpolate(value: &mut Value, env: &HashMap<String, String>) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    let mut path = Vec::new();
    walk(value, env, &mut path, &mut issues);
    issues
}

fn walk(
    value: &mut Value,
    env: &HashMap<String, String>,
    path: &mut Vec<String>,
    issues: &mut Vec<ConfigIssue>,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                path.push(key.clone());
                walk(child, env, path, issues);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                path.push(index.to_string());
                walk(child, env, path, issues);
                path.pop();
            }
        }
        Value::String(s) => {
            let Some(name) = placeholder(s) else {
                return;
            };
            if name.is_empty() {
                issues.push(ConfigIssue::new(
                    path.join("."),
                    "Empty environment variable name",
                ));
                return;
            }
            match env.get(name) {
                Some(resolved) => *s = resolved.clone(),
                None => issues.push(ConfigIssue::new(
                    path.join("."),
                    format!("Environment variable {name} is not defined"),
                )),
            }
        }
        _ => {}
    }
}

/// Variable name referenced by `s`, or `None` when `s` is not a placeholder.
/// `$` and `${}` yield an empty name.
fn placeholder(s: &str) -> Option<&str> {
    if s == "$" {
        return Some("");
    }
    if let Some(inner) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        return (inner.is_empty() || is_var_name(inner)).then_some(inner);
    }
    s.strip_prefix('$').filter(|name| is_var_name(name))
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
