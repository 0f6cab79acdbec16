use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DepotError;

/// A project at the top of the depot hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub name: String,
    pub url: String,
}

/// A distribution inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistRef {
    pub name: String,
    pub url: String,
}

/// A version inside a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    pub name: String,
    pub url: String,
}

/// A downloadable file at the leaf of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileMeta {
    pub name: String,
    pub url: String,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// One matched (project, distribution, version, file) tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEntry {
    pub project: String,
    pub distribution: String,
    pub version: String,
    pub file: FileMeta,
}

/// The ordered result of applying one rule to the catalog. Entry order is
/// catalog traversal order: project, then distribution, then version, then
/// file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    pub entries: Vec<MatchEntry>,
}

impl MatchSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchEntry> {
        self.entries.iter()
    }
}

/// Compiled name filter. Matching is a search anywhere in the name (regex
/// `is_match`, not anchored) and case sensitive; both are fixed policies.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn compile(field: &'static str, pattern: &str) -> Result<Self, DepotError> {
        let regex = Regex::new(pattern).map_err(|err| DepotError::InvalidPattern {
            field,
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}
