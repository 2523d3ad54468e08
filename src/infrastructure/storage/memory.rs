use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::models::KeyValueStorage;
use crate::domain::models::StorageError;

/// Process local storage. Clones share the same underlying map, which lets a
/// second container observe what a first one persisted.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    values: Arc<DashMap<String, String>>,
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        return Ok(self.values.get(key).map(|val| return val.to_string()));
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_string());
        return Ok(());
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);
        return Ok(());
    }
}
