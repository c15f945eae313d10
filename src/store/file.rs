//! File-backed store
//!
//! Keeps every key in one JSON object file, the on-disk equivalent of
//! browser local storage. Writes go to a sibling temp file which is then
//! renamed over the original, so readers never see a half-written file.
//! Concurrent processes race with last-writer-wins.

use super::{KeyValueStore, StoreError, StoreResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable key/value store persisted as a single JSON file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::Decode {
            key: self.path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Load for modification; an unreadable file is replaced rather than
    /// blocking every future write.
    fn load_for_update(&self) -> StoreResult<BTreeMap<String, String>> {
        match self.load() {
            Err(StoreError::Decode { key, error }) => {
                tracing::warn!(path = %key, %error, "Discarding corrupt store file");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        let mut entries = self.load_for_update()?;
        mutate(&mut entries);
        self.save(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.load()?.len())
    }
}
