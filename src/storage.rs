use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::PersistenceError;

pub(crate) trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Stores every key as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub(crate) struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(key), value)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.get("history").unwrap(), None);
        store.set("history", "[]").unwrap();
        assert_eq!(store.get("history").unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("nested/history.json").exists());
    }
}
