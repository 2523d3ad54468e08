#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

use std::fs;
use std::path;

use crate::domain::models::KeyValueStorage;
use crate::domain::models::StorageError;

/// Stores each key as its own file inside a data directory.
pub struct FileStorage {
    pub dir: path::PathBuf,
}

impl FileStorage {
    pub fn new(dir: path::PathBuf) -> FileStorage {
        return FileStorage { dir };
    }

    fn get_file_path(&self, key: &str) -> path::PathBuf {
        return self.dir.join(key);
    }
}

fn io_err(key: &str, source: std::io::Error) -> StorageError {
    return StorageError::Io {
        key: key.to_string(),
        source,
    };
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let file_path = self.get_file_path(key);
        if !file_path.exists() {
            return Ok(None);
        }

        let payload = fs::read_to_string(file_path).map_err(|err| return io_err(key, err))?;
        return Ok(Some(payload));
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|err| return io_err(key, err))?;
        }

        fs::write(self.get_file_path(key), value).map_err(|err| return io_err(key, err))?;
        return Ok(());
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let file_path = self.get_file_path(key);
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).map_err(|err| return io_err(key, err))?;
        return Ok(());
    }
}
