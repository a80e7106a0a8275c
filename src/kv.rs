//! Persisted key-value storage and its change notifications.
//!
//! The item collection is kept as a single JSON value under a fixed key. Every
//! successful `set` is announced to subscribers as a [`StorageChange`] carrying
//! the full new value, which is what the backup worker consumes.
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, error, trace};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;

use crate::{ClipError, Result};

/// A mutation of persisted storage, as seen by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// Host-provided persisted storage: a flat map of keys to JSON values.
pub trait KeyValueStore: Send {
    /// Returns the value stored under `key`, or `None` if nothing was ever set.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replaces the value under `key` and notifies subscribers on success.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Registers a new listener for every subsequent successful `set`.
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StorageChange>;
}

/// Fan-out of change notifications to any number of subscribers.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: Vec<mpsc::UnboundedSender<StorageChange>>,
}

impl ChangeFeed {
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StorageChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, change: StorageChange) {
        // Receivers that were dropped are forgotten.
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        trace!(
            "Published change for key '{}' to {} subscribers",
            change.key,
            self.subscribers.len()
        );
    }
}

/// Stores each key as `<key>.json` inside a data directory.
pub struct JsonFileStore {
    dir: PathBuf,
    feed: ChangeFeed,
}

impl JsonFileStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            debug!("Data directory does not exist, creating: {}", dir.display());
            fs::create_dir_all(&dir).map_err(|e| {
                error!("Failed to create data directory: {}", e);
                ClipError::DirectoryError { path: dir.clone() }
            })?;
        }

        Ok(Self {
            dir,
            feed: ChangeFeed::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ClipError::storage(key, "key must be alphanumeric"));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.key_path(key)?;
        if !path.exists() {
            trace!("No value stored for key '{}'", key);
            return Ok(None);
        }

        let raw = fs::read_to_string(&path).map_err(|e| {
            error!("Failed to read {}: {}", path.display(), e);
            ClipError::storage(key, e.to_string())
        })?;
        let value = serde_json::from_str(&raw).map_err(|e| {
            error!("Stored value for '{}' is not valid JSON: {}", key, e);
            ClipError::storage(key, e.to_string())
        })?;
        Ok(Some(value))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let path = self.key_path(key)?;
        let old_value = self.get(key).unwrap_or_else(|e| {
            debug!("Previous value for '{}' unreadable, treating as absent: {}", key, e);
            None
        });

        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            ClipError::storage(key, e.to_string())
        })?;

        let json = serde_json::to_string(&value)?;
        temp_file
            .write_all(json.as_bytes())
            .and_then(|_| temp_file.flush())
            .map_err(|e| {
                error!("Failed to write temporary file: {}", e);
                ClipError::storage(key, e.to_string())
            })?;

        temp_file.persist(&path).map_err(|e| {
            error!("Failed to persist {}: {}", path.display(), e.error);
            ClipError::storage(key, e.error.to_string())
        })?;

        debug!("Stored key '{}' at {}", key, path.display());
        self.feed.publish(StorageChange {
            key: key.to_string(),
            old_value,
            new_value: value,
        });
        Ok(())
    }

    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StorageChange> {
        self.feed.subscribe()
    }
}

/// In-process storage for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let old_value = self.values.insert(key.to_string(), value.clone());
        self.feed.publish(StorageChange {
            key: key.to_string(),
            old_value,
            new_value: value,
        });
        Ok(())
    }

    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StorageChange> {
        self.feed.subscribe()
    }
}
