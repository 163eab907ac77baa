//! Key-value persistence backends for settings.
//!
//! Keys are flat strings (`"<root>.<moduleId>.<key>"`), values are JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

/// Synchronous key-value store the settings layer persists into.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    /// Returns true if the key existed.
    fn remove(&self, key: &str) -> Result<bool>;
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

fn prefixed(entries: &BTreeMap<String, Value>, prefix: &str) -> Vec<String> {
    entries
        .range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        prefixed(&self.entries.read(), prefix)
    }
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// All entries in one JSON object file, rewritten atomically on each change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?
        } else {
            debug!(path = %path.display(), "Settings file does not exist; starting empty");
            BTreeMap::new()
        };
        info!(path = %path.display(), "Opened settings file");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(entries)
            .context("Failed to serialize settings")?;

        // Write to temp file, then rename for atomicity.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json.as_bytes())
            .with_context(|| format!("Failed to write temp settings: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("Failed to rename temp settings to: {}", self.path.display())
        })?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.flush(&entries)?;
        Ok(true)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        prefixed(&self.entries.read(), prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_prefix_scan() {
        let store = MemoryStore::new();
        store.set("tether.a.x", json!(1)).unwrap();
        store.set("tether.a.y", json!(2)).unwrap();
        store.set("tether.b.x", json!(3)).unwrap();
        assert_eq!(store.keys_with_prefix("tether.a."), vec!["tether.a.x", "tether.a.y"]);
        assert!(store.remove("tether.a.x").unwrap());
        assert!(!store.remove("tether.a.x").unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_json_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("tether.m.volume", json!(0.5)).unwrap();
        store.set("tether.m.name", json!("x")).unwrap();
        store.remove("tether.m.name").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("tether.m.volume"), Some(json!(0.5)));
        assert_eq!(reopened.get("tether.m.name"), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }
}
