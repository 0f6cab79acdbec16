use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{FileMeta, MatchSet};
use crate::error::DepotError;
use crate::fs_util;

/// One matched tuple as it appears in a report. Field order is fixed so the
/// serialized output is byte-identical across runs for the same catalog
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub project: String,
    pub distribution: String,
    pub version: String,
    pub file: FileMeta,
}

/// Flattens a match set into report entries, preserving traversal order.
pub fn entries(set: &MatchSet) -> Vec<ReportEntry> {
    set.iter()
        .map(|entry| ReportEntry {
            project: entry.project.clone(),
            distribution: entry.distribution.clone(),
            version: entry.version.clone(),
            file: entry.file.clone(),
        })
        .collect()
}

pub fn write_json(set: &MatchSet, path: &Utf8Path) -> Result<(), DepotError> {
    let mut content = serde_json::to_vec_pretty(&entries(set))
        .map_err(|err| DepotError::Serialize(err.to_string()))?;
    content.push(b'\n');
    write_report(path, &content)
}

pub fn write_yaml(set: &MatchSet, path: &Utf8Path) -> Result<(), DepotError> {
    let content = serde_yaml_ng::to_string(&entries(set))
        .map_err(|err| DepotError::Serialize(err.to_string()))?;
    write_report(path, content.as_bytes())
}

// Report paths have no mkdir option in the schema; the parent directory has
// to exist up front.
fn write_report(path: &Utf8Path, content: &[u8]) -> Result<(), DepotError> {
    fs_util::require_parent(path)?;
    fs_util::write_bytes_atomic(path, content)
}
