use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Durable key/value storage underneath the credential store
pub trait CredentialBackend: Send + Sync {
    /// Read the raw value stored under `key`
    fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value stored under `key`
    fn save(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// JSON file holding a flat object of keys.
///
/// Writes go to a sibling temp file that is renamed over the original, so a
/// crash mid-write leaves either the old or the new document on disk.
pub struct FileBackend {
    path: PathBuf,
    /// Serializes read-modify-write cycles from this process
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow!(
                "Credential file {} is not a JSON object",
                self.path.display()
            )),
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let contents = serde_json::to_string_pretty(document)?;
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Credential file saved");
        Ok(())
    }

    /// Load the document for a write. A corrupt file is discarded rather than
    /// blocking every future save.
    fn document_for_write(&self) -> Map<String, Value> {
        self.read_document().unwrap_or_else(|e| {
            info!(error = %e, path = %self.path.display(), "Discarding unreadable credential file");
            Map::new()
        })
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let mut document = self.read_document()?;
        Ok(document.remove(key))
    }

    fn save(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut document = self.document_for_write();
        document.insert(key.to_string(), value);
        self.write_document(&document)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut document = self.document_for_write();
        if document.remove(key).is_none() {
            debug!(key, "No stored value to remove");
            return Ok(());
        }
        self.write_document(&document)
    }
}

/// Process-local backend, used when nothing should touch disk
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that already holds `value` under `key`
    pub fn seeded(key: &str, value: Value) -> Self {
        let backend = Self::new();
        backend
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        backend
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}
