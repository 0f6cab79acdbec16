use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Pattern;
use crate::error::DepotError;

/// One rule object as found in the config file. All keys are optional; an
/// absent filter matches everything.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default)]
    pub filter_projects: Option<String>,
    #[serde(default)]
    pub filter_distributions: Option<String>,
    #[serde(default)]
    pub filter_versions: Option<String>,
    #[serde(default)]
    pub filter_files: Option<String>,
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub yaml: Option<String>,
    #[serde(default)]
    pub download: Option<DownloadConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DownloadConfig {
    // kept optional in the schema so a missing path fails that rule at
    // compile time instead of failing the whole file at parse time
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub filename_only: bool,
    #[serde(default)]
    pub mkdir: bool,
    #[serde(default)]
    pub newer_only: bool,
}

/// Immutable, compiled form of a rule. Parsed once per run.
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub projects: Option<Pattern>,
    pub distributions: Option<Pattern>,
    pub versions: Option<Pattern>,
    pub files: Option<Pattern>,
    pub json_path: Option<Utf8PathBuf>,
    pub yaml_path: Option<Utf8PathBuf>,
    pub download: Option<DownloadSpec>,
}

#[derive(Debug, Clone)]
pub struct DownloadSpec {
    pub path: Utf8PathBuf,
    pub filename_only: bool,
    pub mkdir: bool,
    pub newer_only: bool,
}

impl RuleConfig {
    pub fn compile(&self) -> Result<FilterRule, DepotError> {
        let download = match &self.download {
            Some(config) => Some(config.compile()?),
            None => None,
        };

        Ok(FilterRule {
            projects: compile_pattern("filter-projects", self.filter_projects.as_deref())?,
            distributions: compile_pattern(
                "filter-distributions",
                self.filter_distributions.as_deref(),
            )?,
            versions: compile_pattern("filter-versions", self.filter_versions.as_deref())?,
            files: compile_pattern("filter-files", self.filter_files.as_deref())?,
            json_path: self.json.as_deref().map(Utf8PathBuf::from),
            yaml_path: self.yaml.as_deref().map(Utf8PathBuf::from),
            download,
        })
    }
}

impl DownloadConfig {
    fn compile(&self) -> Result<DownloadSpec, DepotError> {
        let path = match self.path.as_deref() {
            Some(path) if !path.trim().is_empty() => Utf8PathBuf::from(path),
            _ => return Err(DepotError::MissingDownloadPath),
        };
        Ok(DownloadSpec {
            path,
            filename_only: self.filename_only,
            mkdir: self.mkdir,
            newer_only: self.newer_only,
        })
    }
}

fn compile_pattern(
    field: &'static str,
    pattern: Option<&str>,
) -> Result<Option<Pattern>, DepotError> {
    pattern.map(|value| Pattern::compile(field, value)).transpose()
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the rule list from a YAML or JSON file; the format is picked by
    /// extension, defaulting to YAML.
    pub fn load(path: &Path) -> Result<Vec<RuleConfig>, DepotError> {
        let content =
            fs::read_to_string(path).map_err(|_| DepotError::ConfigRead(path.to_path_buf()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|err| DepotError::ConfigParse(err.to_string())),
            Some("yaml") | Some("yml") | None => serde_yaml_ng::from_str(&content)
                .map_err(|err| DepotError::ConfigParse(err.to_string())),
            Some(other) => Err(DepotError::ConfigFormat(other.to_string())),
        }
    }
}
