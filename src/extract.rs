use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;

use crate::domain::{ArchiveKind, catalog_parent};
use crate::error::DicomError;
use crate::fs_util;
use crate::retriever::Download;

/// Turns a finished download into the artifact handed to the caller.
#[derive(Debug, Clone)]
pub struct Extractor {
    sync_tool: String,
    verify_zip: bool,
}

impl Extractor {
    pub fn new(sync_tool: impl Into<String>, verify_zip: bool) -> Self {
        Self {
            sync_tool: sync_tool.into(),
            verify_zip,
        }
    }

    pub fn extract(&self, download: &Download) -> Result<Utf8PathBuf, DicomError> {
        match download.kind {
            ArchiveKind::ZipArchive => self.keep_zip(download),
            ArchiveKind::PlainFile => self.keep_plain(download),
            ArchiveKind::CompressedArchive => self.unpack_first_file(download),
        }
    }

    // A zip holds the whole session already.
    fn keep_zip(&self, download: &Download) -> Result<Utf8PathBuf, DicomError> {
        if self.verify_zip {
            fs_util::validate_zip(&download.local)?;
        }
        Ok(download.local.clone())
    }

    fn keep_plain(&self, download: &Download) -> Result<Utf8PathBuf, DicomError> {
        // the file was lifted to the session dir, so the remote source is two levels up
        let remote_dir = catalog_parent(catalog_parent(&download.remote));
        self.write_instruction(remote_dir, &download.local);
        Ok(download.local.clone())
    }

    fn unpack_first_file(&self, download: &Download) -> Result<Utf8PathBuf, DicomError> {
        let archive_path = &download.local;
        let file = fs::File::open(archive_path.as_std_path()).map_err(|err| {
            DicomError::ArchiveOpen {
                path: archive_path.to_string(),
                message: err.to_string(),
            }
        })?;

        let extracted = extract_first_regular_file(GzDecoder::new(file), archive_path);
        if let Err(err) = fs::remove_file(archive_path.as_std_path()) {
            tracing::warn!(archive = %archive_path, error = %err, "cannot remove archive");
        }
        let extracted = extracted?;

        tracing::debug!(%extracted, "DICOM file extracted");
        self.write_instruction(catalog_parent(&download.remote), &extracted);
        Ok(extracted)
    }

    fn write_instruction(&self, remote_dir: &str, artifact: &Utf8Path) {
        let Some(local_dir) = artifact.parent() else {
            return;
        };
        if let Err(err) = fs_util::write_sync_instruction(&self.sync_tool, remote_dir, local_dir)
        {
            tracing::warn!(dir = %local_dir, error = %err, "cannot write command");
        }
    }
}

/// Copies the first regular file of a tar stream next to `archive_path`, named by the entry's
/// base name. Later entries are never read.
pub fn extract_first_regular_file<R: Read>(
    reader: R,
    archive_path: &Utf8Path,
) -> Result<Utf8PathBuf, DicomError> {
    let open_error = |message: String| DicomError::ArchiveOpen {
        path: archive_path.to_string(),
        message,
    };
    let dir = archive_path.parent().unwrap_or(Utf8Path::new("."));

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|err| open_error(err.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| open_error(err.to_string()))?;
        let header = entry.header();
        if !header.entry_type().is_file() {
            continue;
        }
        let mode = header.mode().ok();
        let entry_path = entry
            .path()
            .map_err(|err| open_error(err.to_string()))?
            .into_owned();
        let Some(base) = entry_path.file_name().and_then(|name| name.to_str()) else {
            return Err(open_error(format!(
                "entry without a usable file name: {}",
                entry_path.display()
            )));
        };

        let expected = entry.size();
        let target = dir.join(base);
        let mut source = EntryReader::new(&mut entry);
        let copied = fs_util::copy_reader_to_path(&mut source, &target, mode);
        let failure = match copied {
            Ok(written) if written == expected => return Ok(target),
            Ok(written) => open_error(format!(
                "truncated entry {base}: {written} of {expected} bytes"
            )),
            Err(err) if source.failed => open_error(err.to_string()),
            Err(err) => DicomError::Filesystem(format!("write {target}: {err}")),
        };
        // no partial member is left behind
        if let Err(err) = fs::remove_file(target.as_std_path())
            && err.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(file = %target, error = %err, "cannot remove partial file");
        }
        return Err(failure);
    }

    Err(DicomError::EmptyArchive(archive_path.to_string()))
}

/// Records whether a read from the archive stream failed.
struct EntryReader<R> {
    inner: R,
    failed: bool,
}

impl<R> EntryReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl<R: Read> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|_| self.failed = true)
    }
}
