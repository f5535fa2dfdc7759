//! Per-table settings persisted in a key-value store with a time-to-live.
//!
//! Every entry is stored as JSON `{"data": ..., "timestamp": <ms>}` under
//! `<prefix><table id>`. Entries older than the TTL, or that no longer
//! parse, are deleted on read and reported as absent.

use crate::clock::{Clock, SystemClock};
use crate::color_rules::ColorRule;
use crate::view::ViewState;
use chrono::Duration;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SETTINGS_PREFIX: &str = "datatable-settings-";
pub const DEFAULT_TTL_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

/// String-to-string storage, in the manner of browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError>;
    fn remove(&mut self, key: &str) -> Result<(), SettingsError>;
    fn keys(&self) -> Result<Vec<String>, SettingsError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SettingsError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, SettingsError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// One `<key>.json` file per entry inside a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SettingsError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(FileStore {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SettingsError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(SettingsError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        fs::write(self.path_for(key)?, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SettingsError> {
        match fs::remove_file(self.path_for(key)?) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, SettingsError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredEntry<T> {
    data: T,
    timestamp: i64,
}

/// Everything a table remembers between sessions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSettings {
    #[serde(flatten)]
    pub view: ViewState,
    #[serde(default)]
    pub color_rules: Vec<ColorRule>,
}

pub struct SettingsStore<S: KeyValueStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
    prefix: String,
    ttl: Duration,
}

impl<S: KeyValueStore> SettingsStore<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: KeyValueStore, C: Clock> SettingsStore<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        SettingsStore {
            store,
            clock,
            prefix: SETTINGS_PREFIX.to_string(),
            ttl: Duration::days(DEFAULT_TTL_DAYS),
        }
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    fn key(&self, table_id: &str) -> String {
        format!("{}{}", self.prefix, table_id)
    }

    pub fn save<T: Serialize>(&mut self, table_id: &str, data: &T) -> Result<(), SettingsError> {
        let entry = StoredEntry {
            data,
            timestamp: self.clock.now().timestamp_millis(),
        };
        let json = serde_json::to_string(&entry)?;
        let key = self.key(table_id);
        self.store.set(&key, &json)
    }

    /// Stored settings, or `None` when missing, expired or unreadable.
    /// Storage failures are still errors.
    pub fn load<T: DeserializeOwned>(&mut self, table_id: &str) -> Result<Option<T>, SettingsError> {
        let key = self.key(table_id);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(None);
        };

        let entry: StoredEntry<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("dropping corrupted settings {}: {}", key, e);
                self.store.remove(&key)?;
                return Ok(None);
            }
        };

        if self.is_expired(entry.timestamp) {
            debug!("settings {} expired", key);
            self.store.remove(&key)?;
            return Ok(None);
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!("dropping unreadable settings {}: {}", key, e);
                self.store.remove(&key)?;
                Ok(None)
            }
        }
    }

    pub fn clear(&mut self, table_id: &str) -> Result<(), SettingsError> {
        let key = self.key(table_id);
        self.store.remove(&key)
    }

    /// A timestamp too far from now to subtract counts as expired.
    fn is_expired(&self, timestamp: i64) -> bool {
        match self.clock.now().timestamp_millis().checked_sub(timestamp) {
            Some(age) => age > self.ttl.num_milliseconds(),
            None => true,
        }
    }

    /// Delete every expired or corrupted entry under this store's prefix.
    /// Returns how many were removed.
    pub fn purge_expired(&mut self) -> Result<usize, SettingsError> {
        let mut removed = 0;
        for key in self.store.keys()? {
            if !key.starts_with(&self.prefix) {
                continue;
            }
            let stale = match self.store.get(&key)? {
                Some(raw) => serde_json::from_str::<StoredEntry<serde_json::Value>>(&raw)
                    .map_or(true, |e| self.is_expired(e.timestamp)),
                None => false,
            };
            if stale {
                self.store.remove(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
