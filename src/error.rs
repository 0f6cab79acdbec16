use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Coarse error classification surfaced in run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Config,
    Path,
    Transport,
    Serialization,
}

#[derive(Debug, Error, Diagnostic)]
pub enum DepotError {
    #[error("invalid {field} pattern '{pattern}': {message}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        message: String,
    },

    #[error("download block requires a destination path")]
    MissingDownloadPath,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse config: {0}")]
    ConfigParse(String),

    #[error("unsupported config format: {0}")]
    ConfigFormat(String),

    #[error("parent directory does not exist: {0}")]
    MissingParent(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("failed to serialize report: {0}")]
    Serialize(String),
}

impl DepotError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DepotError::InvalidPattern { .. }
            | DepotError::MissingDownloadPath
            | DepotError::ConfigRead(_)
            | DepotError::ConfigParse(_)
            | DepotError::ConfigFormat(_) => ErrorClass::Config,
            DepotError::MissingParent(_) | DepotError::Filesystem(_) => ErrorClass::Path,
            DepotError::CatalogHttp(_) | DepotError::CatalogStatus { .. } => ErrorClass::Transport,
            DepotError::Serialize(_) => ErrorClass::Serialization,
        }
    }
}
