use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DicomError;

/// Acquisition date in the `YYYYMMDD` form used throughout the repository namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanDate(String);

impl ScanDate {
    pub fn today() -> Self {
        Self(chrono::Local::now().format("%Y%m%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScanDate {
    type Err = DicomError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = normalized.len() == 8
            && normalized.chars().all(|ch| ch.is_ascii_digit())
            && NaiveDate::parse_from_str(normalized, "%Y%m%d").is_ok();
        if !is_valid {
            return Err(DicomError::InvalidDate(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    PlainFile,
    CompressedArchive,
    ZipArchive,
}

impl ArchiveKind {
    /// Classifies by suffix only; the file content is never inspected.
    pub fn classify(path: &str) -> Self {
        if path.ends_with(".zip") {
            ArchiveKind::ZipArchive
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            ArchiveKind::CompressedArchive
        } else {
            ArchiveKind::PlainFile
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::PlainFile => write!(f, "plain"),
            ArchiveKind::CompressedArchive => write!(f, "tar.gz"),
            ArchiveKind::ZipArchive => write!(f, "zip"),
        }
    }
}

/// Queries understood by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Collections below `namespace` whose name contains `date`.
    CollectionsLike { namespace: String, date: ScanDate },
    /// Data objects stored directly in `collection`.
    FilesIn { collection: String },
}

impl Query {
    /// Output format understood by `iquest`.
    pub fn output_format(&self) -> &'static str {
        match self {
            Query::CollectionsLike { .. } => "%s",
            Query::FilesIn { .. } => "%s/%s",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::CollectionsLike { namespace, date } => write!(
                f,
                "SELECT COLL_NAME WHERE COLL_NAME LIKE '{namespace}/%{date}%'"
            ),
            Query::FilesIn { collection } => write!(
                f,
                "SELECT COLL_NAME,DATA_NAME WHERE COLL_NAME = '{collection}'"
            ),
        }
    }
}

/// Parent collection of a `/`-separated catalog name.
pub fn catalog_parent(name: &str) -> &str {
    let trimmed = name.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(index) => &trimmed[..index],
        None => ".",
    }
}

/// Last component of a `/`-separated catalog name.
pub fn catalog_base(name: &str) -> &str {
    let trimmed = name.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    }
}
