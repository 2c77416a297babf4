//! Error taxonomy for package and media operations.
//!
//! Whole-operation calls (create, open, save, duplicate, delete) return these
//! to the caller. Best-effort background work logs them instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project package already exists: {}", .0.display())]
    PackageAlreadyExists(PathBuf),

    #[error("Operation requires a saved project location")]
    NoProjectUrl,

    #[error("Invalid package structure: {0}")]
    InvalidPackageStructure(String),

    #[error("Unsupported schema version: {0}")]
    UnsupportedSchemaVersion(u32),

    #[error("Save failed: {0}")]
    SaveFailed(String),

    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("Media import failed for {}: {cause}", file.display())]
    MediaImportFailed { file: PathBuf, cause: String },

    #[error("Unknown project template: {0}")]
    UnknownTemplate(String),

    #[error("Unrecognized media type: {}", .0.display())]
    UnknownMediaType(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProjectError {
    pub fn import_failed(file: impl Into<PathBuf>, cause: impl ToString) -> Self {
        ProjectError::MediaImportFailed {
            file: file.into(),
            cause: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectError>;
