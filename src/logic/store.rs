//! Flat JSON key/value stores.
//!
//! The scan cache, the new-process ledger and user preferences all persist
//! as a single pretty-printed JSON object on disk. Stores load best-effort:
//! a missing or corrupted file yields an empty store rather than an error.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

// ============================================================================
// ERRORS
// ============================================================================

/// Error raised when a store cannot be written back to disk.
#[derive(Debug)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

// ============================================================================
// PUBLIC API
// ============================================================================

/// In-memory JSON object with explicit flushes to a backing file.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    entries: HashMap<String, Value>,
}

impl JsonStore {
    /// Opens the store backed by `dir/name`, loading any existing content.
    pub fn open(dir: &Path, name: &str) -> Self {
        let path = dir.join(name);
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<HashMap<String, Value>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("Discarding unreadable store {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, entries }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the whole store as a JSON object.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.entries.clone().into_iter().collect())
    }

    /// Replaces the store content with the fields of a JSON object.
    pub fn replace_with(&mut self, value: Value) -> Result<(), StoreError> {
        match value {
            Value::Object(map) => {
                self.entries = map.into_iter().collect();
                self.flush()
            }
            other => Err(StoreError(format!(
                "expected JSON object, got {}",
                other
            ))),
        }
    }

    /// Writes the store back to its file, creating parent directories.
    pub fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError(format!("create {}: {}", parent.display(), e)))?;
        }
        let data = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| StoreError(format!("serialize {}: {}", self.path.display(), e)))?;
        fs::write(&self.path, data)
            .map_err(|e| StoreError(format!("write {}: {}", self.path.display(), e)))
    }

    /// Size of the backing file in bytes, zero when it does not exist.
    pub fn size_on_disk(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Drops every entry and persists the now-empty store.
    pub fn purge(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        self.flush()
    }
}

// ============================================================================
// TESTS
// ============================================================================
