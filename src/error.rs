use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DicomError {
    #[error("invalid date string (expected YYYYMMDD): {0}")]
    InvalidDate(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("catalog query failed: {0}")]
    Catalog(String),

    #[error("unknown path (date marker {date} not found): {name}")]
    PathResolution { name: String, date: String },

    #[error("cannot create dir {path}: {message}")]
    DirectoryCreation { path: String, message: String },

    #[error("transfer of {name} failed with exit status {status}: {message}")]
    Transfer {
        name: String,
        status: i32,
        message: String,
    },

    #[error("cannot open archive {path}: {message}")]
    ArchiveOpen { path: String, message: String },

    #[error("empty archive: {0}")]
    EmptyArchive(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
