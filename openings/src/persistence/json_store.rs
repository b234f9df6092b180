use super::PersistenceError;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::path::PathBuf;

/// JSON-file-per-record store keyed by an explicit id.
pub struct JsonStore<T> {
    dir: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> JsonStore<T> {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            _phantom: PhantomData,
        }
    }

    fn ensure_dir(&self) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn save(&self, id: &str, data: &T) -> Result<(), PersistenceError> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(self.file_path(id), json)?;
        Ok(())
    }

    /// Load a record by id. Returns None if not found.
    pub fn load(&self, id: &str) -> Result<Option<T>, PersistenceError> {
        let path = self.file_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let data = serde_json::from_str(&contents)?;
        Ok(Some(data))
    }
}
