use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use camino::Utf8Path;

use crate::domain::Query;
use crate::error::DicomError;

/// Lazily produced query results. A trailing `Err` reports that the query failed after the
/// names yielded before it.
pub type CatalogLines = Box<dyn Iterator<Item = Result<String, DicomError>> + Send>;

pub trait CatalogClient: Send + Sync {
    fn list_matching(&self, query: &Query) -> Result<CatalogLines, DicomError>;
    fn fetch(&self, remote: &str, destination: &Utf8Path) -> Result<(), DicomError>;
}

/// Catalog client backed by the iRODS icommands `iquest` and `iget`.
#[derive(Debug, Clone)]
pub struct IcommandsClient {
    iquest: PathBuf,
    iget: PathBuf,
}

impl IcommandsClient {
    pub fn new() -> Result<Self, DicomError> {
        let iquest =
            find_in_path("iquest").ok_or_else(|| DicomError::MissingTool("iquest".to_string()))?;
        let iget =
            find_in_path("iget").ok_or_else(|| DicomError::MissingTool("iget".to_string()))?;
        Ok(Self { iquest, iget })
    }

    pub fn with_programs(iquest: PathBuf, iget: PathBuf) -> Self {
        Self { iquest, iget }
    }
}

impl CatalogClient for IcommandsClient {
    fn list_matching(&self, query: &Query) -> Result<CatalogLines, DicomError> {
        tracing::debug!(%query, "iquest");
        let mut child = Command::new(&self.iquest)
            .arg("--no-page")
            .arg(query.output_format())
            .arg(query.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| DicomError::Catalog(format!("spawn iquest: {err}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DicomError::Catalog("iquest stdout not captured".to_string()))?;
        let stderr = child.stderr.take();
        let stderr_drain = thread::spawn(move || {
            let mut collected = Vec::new();
            if let Some(stderr) = stderr {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    tracing::error!("{line}");
                    collected.push(line);
                }
            }
            collected.join("\n")
        });

        Ok(Box::new(QueryLines {
            child: Some(child),
            lines: BufReader::new(stdout),
            stderr_drain: Some(stderr_drain),
        }))
    }

    fn fetch(&self, remote: &str, destination: &Utf8Path) -> Result<(), DicomError> {
        let output = Command::new(&self.iget)
            .arg("-f")
            .arg(remote)
            .arg(destination.as_str())
            .stdin(Stdio::null())
            .output()
            .map_err(|err| DicomError::Transfer {
                name: remote.to_string(),
                status: -1,
                message: err.to_string(),
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", self.iget.display())
        } else {
            stderr
        };
        Err(DicomError::Transfer {
            name: remote.to_string(),
            status: output.status.code().unwrap_or(-1),
            message,
        })
    }
}

struct QueryLines {
    child: Option<Child>,
    lines: BufReader<ChildStdout>,
    stderr_drain: Option<JoinHandle<String>>,
}

impl QueryLines {
    fn finish(&mut self) -> Option<Result<String, DicomError>> {
        let mut child = self.child.take()?;
        let diagnostic = self
            .stderr_drain
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        match child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(Err(DicomError::Catalog(format!(
                "iquest exited with {status}: {diagnostic}"
            )))),
            Err(err) => Some(Err(DicomError::Catalog(err.to_string()))),
        }
    }
}

impl Iterator for QueryLines {
    type Item = Result<String, DicomError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.child.as_ref()?;
        let mut line = String::new();
        match self.lines.read_line(&mut line) {
            Ok(0) => self.finish(),
            Ok(_) => Some(Ok(line.trim_end_matches(['\r', '\n']).to_string())),
            Err(err) => {
                let _ = self.finish();
                Some(Err(DicomError::Catalog(err.to_string())))
            }
        }
    }
}

impl Drop for QueryLines {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_file(candidate))
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|meta| meta.is_file()).unwrap_or(false)
}
