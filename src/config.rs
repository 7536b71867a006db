use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::DicomError;

pub const CONFIG_FILE_NAME: &str = "dr-get-dicom.json";
pub const DEFAULT_NAMESPACE: &str = "/rdm/di/dccn";
pub const DEFAULT_DEST_ROOT: &str = "/project/3055010.01";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_SYNC_TOOL: &str = "irsync";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub collections: Option<Vec<String>>,
    #[serde(default)]
    pub dest_root: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub sync_tool: Option<String>,
    #[serde(default)]
    pub verify_zip: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub namespace: String,
    pub collections: Vec<String>,
    pub dest_root: Utf8PathBuf,
    pub workers: usize,
    pub sync_tool: String,
    pub verify_zip: bool,
}

impl ResolvedConfig {
    /// Namespace scanned for one catch-all collection.
    pub fn raw_namespace(&self, collection: &str) -> String {
        format!(
            "{}/{}/raw",
            self.namespace.trim_end_matches('/'),
            collection.trim_matches('/')
        )
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            collections: default_collections(),
            dest_root: Utf8PathBuf::from(DEFAULT_DEST_ROOT),
            workers: DEFAULT_WORKERS,
            sync_tool: DEFAULT_SYNC_TOOL.to_string(),
            verify_zip: false,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the explicit path if given, otherwise the first config found in the working
    /// directory or the user config directory. Without any file the defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, DicomError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            return Self::resolve_config(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| DicomError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| DicomError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, DicomError> {
        let workers = config.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(DicomError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }

        let collections = config.collections.unwrap_or_else(default_collections);
        if collections.iter().any(|coll| coll.trim().is_empty()) {
            return Err(DicomError::InvalidConfig(
                "collection names must not be empty".to_string(),
            ));
        }

        let sync_tool = config
            .sync_tool
            .unwrap_or_else(|| DEFAULT_SYNC_TOOL.to_string());
        if sync_tool.trim().is_empty() {
            return Err(DicomError::InvalidConfig(
                "sync_tool must not be empty".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            namespace: config
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            collections,
            dest_root: Utf8PathBuf::from(
                config
                    .dest_root
                    .unwrap_or_else(|| DEFAULT_DEST_ROOT.to_string()),
            ),
            workers,
            sync_tool,
            verify_zip: config.verify_zip.unwrap_or(false),
        })
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("nl", "dccn", "dr-get-dicom")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }
}

pub fn default_collections() -> Vec<String> {
    vec![
        "DAC_3055010.01_490".to_string(),
        "DAC_3010000.01_173".to_string(),
    ]
}
