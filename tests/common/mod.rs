#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

use dr_get_dicom::catalog::{CatalogClient, CatalogLines};
use dr_get_dicom::domain::Query;
use dr_get_dicom::error::DicomError;

pub const DATE: &str = "20240101";

/// In-memory catalog. Fetched `.tar.gz` objects get a gzipped tar holding one DICOM file,
/// everything else a few bytes of payload.
#[derive(Default)]
pub struct MockCatalog {
    pub collections: Vec<String>,
    pub scan_fails_after: bool,
    pub files: HashMap<String, Vec<String>>,
    pub failing_fetches: HashSet<String>,
    pub fetched: Mutex<Vec<String>>,
    pub listed: Mutex<Vec<String>>,
}

impl MockCatalog {
    pub fn with_collections(collections: Vec<String>) -> Self {
        Self {
            collections,
            ..Self::default()
        }
    }

    pub fn add_files(&mut self, collection: &str, files: &[&str]) {
        self.files.insert(
            collection.to_string(),
            files.iter().map(|file| format!("{collection}/{file}")).collect(),
        );
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }
}

impl CatalogClient for MockCatalog {
    fn list_matching(&self, query: &Query) -> Result<CatalogLines, DicomError> {
        match query {
            Query::CollectionsLike { .. } => {
                let mut lines: Vec<Result<String, DicomError>> =
                    self.collections.iter().cloned().map(Ok).collect();
                if self.scan_fails_after {
                    lines.push(Err(DicomError::Catalog("connection reset".to_string())));
                }
                Ok(Box::new(lines.into_iter()))
            }
            Query::FilesIn { collection } => {
                self.listed.lock().unwrap().push(collection.clone());
                let rows = self.files.get(collection).cloned().unwrap_or_else(|| {
                    vec!["CAT_NO_ROWS_FOUND: Nothing was found matching your query".to_string()]
                });
                Ok(Box::new(rows.into_iter().map(Ok::<String, DicomError>)))
            }
        }
    }

    fn fetch(&self, remote: &str, destination: &Utf8Path) -> Result<(), DicomError> {
        self.fetched.lock().unwrap().push(remote.to_string());
        if self.failing_fetches.contains(remote) {
            return Err(DicomError::Transfer {
                name: remote.to_string(),
                status: 4,
                message: "USER_FILE_DOES_NOT_EXIST".to_string(),
            });
        }
        let content = if remote.ends_with(".tar.gz") {
            tgz(&[("series/", None), ("series/IM0001.IMA", Some(&b"DICM-1"[..]))])
        } else {
            b"DICM".to_vec()
        };
        fs::write(destination.as_std_path(), content)
            .map_err(|err| DicomError::Filesystem(err.to_string()))
    }
}

/// Gzipped tar with the given entries; `None` marks a directory.
pub fn tgz(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        match data {
            None => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                builder
                    .append_data(&mut header, name, std::io::empty())
                    .unwrap();
            }
            Some(bytes) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(bytes.len() as u64);
                header.set_mode(0o640);
                builder.append_data(&mut header, name, *bytes).unwrap();
            }
        }
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}
