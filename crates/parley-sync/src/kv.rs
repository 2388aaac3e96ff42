// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/value store implementations: in-memory and a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use parley_core::error::ParleyError;
use parley_core::traits::{KeyValueStore, PortAdapter, StorageKey};
use parley_core::types::HealthStatus;

/// Volatile store. Used in tests and when no state path is configured.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a raw value, bypassing any encoding. Test hook for corrupt state.
    pub fn insert_raw(&self, key: &StorageKey, value: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.render(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PortAdapter for MemoryKeyValueStore {
    fn name(&self) -> &str {
        "memory-kv"
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &StorageKey) -> Result<Option<String>, ParleyError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.render())
            .cloned())
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<(), ParleyError> {
        self.insert_raw(key, value);
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), ParleyError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.render());
        Ok(())
    }
}

/// Store persisted as one JSON object on disk.
///
/// Every write rewrites the file through a sibling temp file and a rename.
/// An unreadable or corrupt file is logged and treated as empty.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Opens the store at `path`, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ParleyError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }

        let entries = load_entries(&path);
        debug!(path = %path.display(), entries = entries.len(), "opened state file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored entries keyed by their rendered key.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), ParleyError> {
        let json = serde_json::to_vec_pretty(entries).map_err(storage_err)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(storage_err)?;
        std::fs::rename(&tmp, &self.path).map_err(storage_err)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), ParleyError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries);
        self.persist(&entries)
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file unreadable, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file corrupt, starting empty");
            BTreeMap::new()
        }
    }
}

fn storage_err(e: impl std::error::Error + Send + Sync + 'static) -> ParleyError {
    ParleyError::Storage {
        source: Box::new(e),
    }
}

#[async_trait]
impl PortAdapter for FileKeyValueStore {
    fn name(&self) -> &str {
        "file-kv"
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => Ok(
                HealthStatus::Unhealthy(format!("state directory {} missing", dir.display())),
            ),
            _ => Ok(HealthStatus::Healthy),
        }
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &StorageKey) -> Result<Option<String>, ParleyError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.render())
            .cloned())
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<(), ParleyError> {
        self.update(|entries| {
            entries.insert(key.render(), value.to_string());
        })
    }

    fn remove(&self, key: &StorageKey) -> Result<(), ParleyError> {
        self.update(|entries| {
            entries.remove(&key.render());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::traits::StorageField;
    use parley_core::types::AgentId;

    fn key(field: StorageField) -> StorageKey {
        StorageKey::agent(&AgentId("acme".into()), field)
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryKeyValueStore::new();
        let k = key(StorageField::VisitorId);
        assert_eq!(store.get(&k).unwrap(), None);
        store.set(&k, "\"visitor_1\"").unwrap();
        assert_eq!(store.get(&k).unwrap().as_deref(), Some("\"visitor_1\""));
        store.remove(&k).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let k = key(StorageField::LastConversation);

        {
            let store = FileKeyValueStore::open(&path).unwrap();
            store.set(&k, "\"c1\"").unwrap();
        }

        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get(&k).unwrap().as_deref(), Some("\"c1\""));
        assert_eq!(reopened.entries().len(), 1);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(store.get(&key(StorageField::VisitorId)).unwrap(), None);

        // The next write replaces the corrupt file.
        store.set(&key(StorageField::VisitorId), "\"v\"").unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("parley:acme:visitor_id"));
    }
}
