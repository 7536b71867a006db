use std::fs;
use std::io::{self, Read, Write};

use camino::Utf8Path;
use zip::ZipArchive;

use crate::error::DicomError;

pub const SYNC_SCRIPT_NAME: &str = "cmd.sh";

/// Reads every entry of the zip to the end, surfacing CRC and truncation errors.
pub fn validate_zip(zip_path: &Utf8Path) -> Result<(), DicomError> {
    let open_error = |message: String| DicomError::ArchiveOpen {
        path: zip_path.to_string(),
        message,
    };
    let file = fs::File::open(zip_path.as_std_path()).map_err(|err| open_error(err.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|err| open_error(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| open_error(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|err| open_error(err.to_string()))?;
    }
    Ok(())
}

/// Streams `reader` into a new file at `path`, created with `mode` on unix.
pub fn copy_reader_to_path<R: Read>(
    reader: &mut R,
    path: &Utf8Path,
    mode: Option<u32>,
) -> io::Result<u64> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if let Some(mode) = mode {
            options.mode(mode);
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path.as_std_path())?;
    let written = io::copy(reader, &mut file)?;
    file.flush()?;
    Ok(written)
}

/// Writes `cmd.sh` into `local_dir` with the command that syncs the full remote directory.
/// The script is left for a person to run; it is never executed here.
pub fn write_sync_instruction(
    sync_tool: &str,
    remote_dir: &str,
    local_dir: &Utf8Path,
) -> Result<(), DicomError> {
    let path = local_dir.join(SYNC_SCRIPT_NAME);
    let content = format!("{sync_tool} -r i:{remote_dir} {local_dir}\n");

    let temp = tempfile::Builder::new()
        .prefix(".cmd")
        .tempfile_in(local_dir.as_std_path())
        .map_err(|err| DicomError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content.as_bytes())
        .map_err(|err| DicomError::Filesystem(err.to_string()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o755))
            .map_err(|err| DicomError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| DicomError::Filesystem(err.to_string()))?;
    Ok(())
}
