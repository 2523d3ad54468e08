use std::sync::Arc;

use super::StorageError;

/// Durable string key/value storage, the equivalent of browser local storage.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub type StorageBox = Arc<dyn KeyValueStorage + Send + Sync>;
