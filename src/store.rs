//! Key-value store backends.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{Error, KeyValueStore};

/// Process-local store. Nothing survives the process.
#[derive(Default, Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by one JSON object file.
///
/// The whole file is rewritten on every `set`, through a sibling temp file
/// and a rename so a crash never leaves a half-written store behind. A
/// missing file reads as an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                Error::Store(format!("{} is not a valid store: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value.to_string());
        self.write(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites_by_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get("balance:alice").unwrap(), None);

        store.set("balance:alice", "1").unwrap();
        store.set("balance:alice", "2").unwrap();
        assert_eq!(store.get("balance:alice").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("status:alice", "true").unwrap();
        store.set("balance:alice", "12.5").unwrap();
        drop(store);

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("status:alice").unwrap().as_deref(), Some("true"));
        assert_eq!(store.get("balance:alice").unwrap().as_deref(), Some("12.5"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(JsonFileStore::open(&path), Err(Error::Store(_))));
    }
}
