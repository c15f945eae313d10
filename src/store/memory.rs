//! In-memory store
//!
//! Used as the session scope (cleared when the process exits) and in tests.

use super::{KeyValueStore, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local key/value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, for diagnostics
    pub fn entries(&self) -> StoreResult<HashMap<String, String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(entries.clone())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty().unwrap());

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(store.len().unwrap(), 1);

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
    }
}
