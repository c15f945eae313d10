//! Key/Value Storage
//!
//! The persistence seam shared by the activity tracker and the cutoff
//! establisher. Two scopes exist in practice:
//!
//! - **durable**: survives restarts ([`FileStore`])
//! - **session**: lives as long as the process ([`MemoryStore`])
//!
//! Values are JSON-encoded strings. The typed helpers [`read_json`] and
//! [`write_json`] keep encoding in one place so callers never touch raw
//! strings.

pub mod error;
pub mod file;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A string key/value store with the semantics of browser local storage
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value under `key`
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Replace the value under `key`
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete `key`, a no-op when absent
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Number of keys currently stored
    fn len(&self) -> StoreResult<usize>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Read and decode a JSON value.
///
/// Returns `Ok(None)` when the key is absent and [`StoreError::Decode`] when
/// the stored text is not valid JSON for `T`.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key)? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Decode {
                key: key.to_string(),
                error: e.to_string(),
            }),
    }
}

/// Encode a value as JSON and store it
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}
