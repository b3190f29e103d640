// src/updates/store.rs

//! Durable key-value storage for the scheduler's two persisted fields.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::StoreError;

use super::core::PersistedState;

/// Timestamp of the last successful automatic check (RFC 3339).
pub const LAST_CHECK_KEY: &str = "lastAutomaticUpdateCheck";

/// Consecutive failed checks.
pub const FAILURE_COUNT_KEY: &str = "updateCheckFailureCount";

/// Abstract string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Stores values in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores values as a flat TOML table of strings in a single file.
///
/// The whole file is read and rewritten on every `set`; the store only
/// holds a handful of keys.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    fn save_all(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let contents = toml::to_string(map)?;
        fs::write(&self.path, contents).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load_all()?;
        map.insert(key.to_string(), value.to_string());
        self.save_all(&map)?;
        debug!(path = ?self.path, key, "stored value (file)");
        Ok(())
    }
}

pub fn read_last_success(store: &dyn KeyValueStore) -> Result<Option<DateTime<Utc>>, StoreError> {
    let Some(raw) = store.get(LAST_CHECK_KEY)? else {
        return Ok(None);
    };

    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|_| StoreError::InvalidValue {
            key: LAST_CHECK_KEY.to_string(),
            value: raw,
        })
}

pub fn write_last_success(store: &dyn KeyValueStore, at: DateTime<Utc>) -> Result<(), StoreError> {
    store.set(LAST_CHECK_KEY, &at.to_rfc3339())
}

pub fn read_failure_count(store: &dyn KeyValueStore) -> Result<u32, StoreError> {
    match store.get(FAILURE_COUNT_KEY)? {
        None => Ok(0),
        Some(raw) => raw.trim().parse().map_err(|_| StoreError::InvalidValue {
            key: FAILURE_COUNT_KEY.to_string(),
            value: raw,
        }),
    }
}

pub fn write_failure_count(store: &dyn KeyValueStore, count: u32) -> Result<(), StoreError> {
    store.set(FAILURE_COUNT_KEY, &count.to_string())
}

/// Read both durable fields, falling back to defaults for anything that
/// cannot be read.
pub fn load_persisted(store: &dyn KeyValueStore) -> PersistedState {
    let last_success = read_last_success(store).unwrap_or_else(|err| {
        warn!(error = %err, "could not read last update check; treating as never");
        None
    });
    let failure_count = read_failure_count(store).unwrap_or_else(|err| {
        warn!(error = %err, "could not read update failure count; treating as 0");
        0
    });

    PersistedState {
        last_success,
        failure_count,
    }
}
