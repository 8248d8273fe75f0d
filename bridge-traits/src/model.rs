//! # Content Source & Repository Records
//!
//! Run-scoped copies of the records the engine reads from the record store.
//! The store owns these; the engine never mutates a `ContentSource` or `Repo`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::provider::{AdapterError, AdapterResult};

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of a content source record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentSourceId(pub i64);

impl ContentSourceId {
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ContentSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ContentSourceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of a repository record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoId(pub i64);

impl RepoId {
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RepoId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Connection configuration of a content source.
///
/// Values are kept as strings; adapters parse what they need through the
/// typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, String>);

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Read a boolean flag, falling back to `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Configuration` when the value is not a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> AdapterResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                other => Err(AdapterError::Configuration(format!(
                    "Property [{}] must be a boolean, got [{}]",
                    key, other
                ))),
            },
        }
    }

    /// Read a mandatory property.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Configuration` when the property is missing or blank.
    pub fn require(&self, key: &str) -> AdapterResult<&str> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(AdapterError::Configuration(format!(
                "Missing required property [{}]",
                key
            ))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Descriptor naming the adapter implementation that services a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSourceType {
    /// Registry key of the adapter implementation
    pub name: String,
    pub display_name: Option<String>,
}

impl ContentSourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
        }
    }
}

/// One externally reachable repository endpoint serviced by one adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSource {
    pub id: ContentSourceId,
    pub name: String,
    pub source_type: ContentSourceType,
    pub configuration: Configuration,
}

impl ContentSource {
    pub fn new(
        id: impl Into<ContentSourceId>,
        name: impl Into<String>,
        source_type: ContentSourceType,
        configuration: Configuration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source_type,
            configuration,
        }
    }
}

/// A named grouping of content sources synchronized as a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub name: String,
    pub description: Option<String>,
    /// Attached sources in their persisted enumeration order
    pub content_sources: Vec<ContentSource>,
}

impl Repo {
    pub fn new(id: impl Into<RepoId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            content_sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: ContentSource) -> Self {
        self.content_sources.push(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_accessors() {
        let config = Configuration::new()
            .with("rootDirectory", "/srv/content")
            .with("packageSourceEnabled", "YES")
            .with("blank", "  ");

        assert_eq!(config.get("rootDirectory"), Some("/srv/content"));
        assert!(config.get_bool("packageSourceEnabled", false).unwrap());
        assert!(config.get_bool("missing", true).unwrap());
        assert!(config.require("blank").is_err());
        assert!(config.require("missing").is_err());
        assert_eq!(config.require("rootDirectory").unwrap(), "/srv/content");
    }

    #[test]
    fn test_configuration_rejects_bad_boolean() {
        let config = Configuration::new().with("flag", "maybe");
        let err = config.get_bool("flag", false).unwrap_err();
        assert!(err.to_string().contains("flag"));
    }

    #[test]
    fn test_repo_keeps_source_order() {
        let source = |id: i64| {
            ContentSource::new(
                id,
                format!("source-{}", id),
                ContentSourceType::new("disk"),
                Configuration::new(),
            )
        };
        let repo = Repo::new(7, "rhel").with_source(source(2)).with_source(source(1));

        let ids: Vec<i64> = repo.content_sources.iter().map(|s| s.id.get()).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
