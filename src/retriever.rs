use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::catalog::CatalogClient;
use crate::domain::{ArchiveKind, ScanDate};
use crate::error::DicomError;

/// A remote file fetched to its local destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub remote: String,
    pub local: Utf8PathBuf,
    pub kind: ArchiveKind,
}

/// Maps a remote name onto `<dest_root>/<date>/<everything after the date>`.
///
/// Single DICOM files are lifted out of their series folder so every file of a session lands
/// in the session directory.
pub fn resolve_local_path(
    remote: &str,
    date: &ScanDate,
    dest_root: &Utf8Path,
) -> Result<Utf8PathBuf, DicomError> {
    let marker = date.as_str();
    let index = remote
        .find(marker)
        .ok_or_else(|| DicomError::PathResolution {
            name: remote.to_string(),
            date: marker.to_string(),
        })?;
    let relative = remote[index + marker.len()..].trim_start_matches('/');
    let local = dest_root.join(marker).join(relative);

    if ArchiveKind::classify(remote) != ArchiveKind::PlainFile {
        return Ok(local);
    }

    let file_name = local
        .file_name()
        .ok_or_else(|| DicomError::PathResolution {
            name: remote.to_string(),
            date: marker.to_string(),
        })?
        .to_string();
    let session_dir = local
        .parent()
        .and_then(Utf8Path::parent)
        .ok_or_else(|| DicomError::PathResolution {
            name: remote.to_string(),
            date: marker.to_string(),
        })?;
    Ok(session_dir.join(file_name))
}

pub struct Retriever<C: CatalogClient> {
    client: Arc<C>,
    date: ScanDate,
    dest_root: Utf8PathBuf,
}

impl<C: CatalogClient> Retriever<C> {
    pub fn new(client: Arc<C>, date: ScanDate, dest_root: Utf8PathBuf) -> Self {
        Self {
            client,
            date,
            dest_root,
        }
    }

    pub fn retrieve(&self, remote: &str) -> Result<Download, DicomError> {
        let local = resolve_local_path(remote, &self.date, &self.dest_root)?;
        if let Some(dir) = local.parent() {
            fs::create_dir_all(dir.as_std_path()).map_err(|err| {
                DicomError::DirectoryCreation {
                    path: dir.to_string(),
                    message: err.to_string(),
                }
            })?;
        }

        tracing::debug!(remote, %local, "fetching");
        self.client.fetch(remote, &local)?;

        Ok(Download {
            remote: remote.to_string(),
            kind: ArchiveKind::classify(local.as_str()),
            local,
        })
    }
}
