//! Namespace path newtype.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Path-like name of a namespace, e.g. `"/chat"`.
///
/// Paths are plain map keys: `"/chat/rooms"` is unrelated to `"/chat"`.
/// Construction normalizes the input so that every path starts with a
/// single `/` and carries no surrounding whitespace; the empty string maps
/// to the root namespace `"/"`. Construction never fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NamespacePath(String);

impl NamespacePath {
    /// The root namespace `"/"`.
    pub const ROOT: &'static str = "/";

    /// Builds a normalized namespace path.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches('/');
        Self(format!("/{trimmed}"))
    }

    /// Returns the root namespace.
    #[must_use]
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NamespacePath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NamespacePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for NamespacePath {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl<'de> Deserialize<'de> for NamespacePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}
