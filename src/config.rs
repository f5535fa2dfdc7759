use crate::downloader::ExportOptions;
use crate::settings::{DEFAULT_TTL_DAYS, SETTINGS_PREFIX};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "DATATABLE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Defaults for the CLI and for persisted settings. Every field is optional
/// in the file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub settings_prefix: String,
    pub settings_ttl_days: i64,
    /// Directory for file-backed settings; in-memory when unset.
    pub settings_dir: Option<PathBuf>,
    /// Forced import delimiter; detected from the header line when unset.
    pub csv_delimiter: Option<char>,
    pub export: ExportOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settings_prefix: SETTINGS_PREFIX.to_string(),
            settings_ttl_days: DEFAULT_TTL_DAYS,
            settings_dir: None,
            csv_delimiter: None,
            export: ExportOptions::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Explicit path first, then `DATATABLE_CONFIG`, then defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        match explicit {
            Some(path) => Config::load(path),
            None => match env::var_os(CONFIG_ENV) {
                Some(path) => Config::load(PathBuf::from(path)),
                None => Ok(Config::default()),
            },
        }
    }
}
