//! Artifact hash validation.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Returns true when `hash` is a non-empty string of ASCII hex digits.
pub fn is_valid_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A client-supplied artifact hash.
///
/// The value is kept verbatim (case is preserved) and is used directly as the
/// last component of the storage key, so it can only be constructed through
/// [`ArtifactHash::parse`], which enforces `[a-fA-F0-9]+`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ArtifactHash(String);

impl ArtifactHash {
    /// Parse and validate a hash string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if is_valid_hash(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::Error::InvalidHash(s.to_string()))
        }
    }

    /// Get the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ArtifactHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactHash({})", self.0)
    }
}

impl fmt::Display for ArtifactHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ArtifactHash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for ArtifactHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
