//! Artifact metadata and namespace scoping.

use crate::hash::ArtifactHash;
use serde::{Deserialize, Serialize};

/// Segment used in place of an absent or blank scope field.
pub const UNSCOPED_SEGMENT: &str = "_";

/// Metadata stored alongside every artifact body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    /// Exact byte length of the stored body.
    pub size: u64,
    /// Execution time of the task that produced the artifact, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Opaque client label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ArtifactMetadata {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            duration_ms: None,
            tag: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// A `(teamId, slug)` namespace partition.
///
/// The default scope is unscoped and maps to `_/_`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl ArtifactScope {
    pub fn new(team_id: Option<String>, slug: Option<String>) -> Self {
        Self { team_id, slug }
    }

    /// Scope for a team only.
    pub fn team(team_id: impl Into<String>) -> Self {
        Self {
            team_id: Some(team_id.into()),
            slug: None,
        }
    }

    /// Resolve the `(team, slug)` directory segments.
    ///
    /// Blank fields become [`UNSCOPED_SEGMENT`]. Segments that could escape
    /// their parent directory or alias another key, including a literal
    /// [`UNSCOPED_SEGMENT`], are rejected.
    pub fn segments(&self) -> crate::Result<(&str, &str)> {
        Ok((
            normalize_segment(self.team_id.as_deref())?,
            normalize_segment(self.slug.as_deref())?,
        ))
    }

    /// Storage key `team/slug/hash` for an artifact in this scope.
    pub fn object_key(&self, hash: &ArtifactHash) -> crate::Result<String> {
        let (team, slug) = self.segments()?;
        Ok(format!("{team}/{slug}/{hash}"))
    }

    /// Check that this scope maps to a usable storage location.
    pub fn validate(&self) -> crate::Result<()> {
        self.segments().map(|_| ())
    }
}

fn normalize_segment(value: Option<&str>) -> crate::Result<&str> {
    let Some(trimmed) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(UNSCOPED_SEGMENT);
    };

    let unsafe_segment = trimmed == "."
        || trimmed == ".."
        || trimmed == UNSCOPED_SEGMENT
        || trimmed
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if unsafe_segment {
        return Err(crate::Error::InvalidScope(trimmed.to_string()));
    }

    Ok(trimmed)
}
