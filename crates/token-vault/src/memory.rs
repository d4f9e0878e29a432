//! In-memory token storage.

use crate::{StorageResult, TokenStorage};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage backend.
///
/// Tokens live only as long as the process. Useful for tests and for
/// callers that do not want sessions persisted to disk.
#[derive(Default)]
pub struct MemoryTokenStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.write().map_err(poisoned)?;
        Ok(data.remove(key).is_some())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> crate::StorageError {
    crate::StorageError::Backend("storage lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_delete() {
        let storage = MemoryTokenStore::new();

        storage.set("test_key", "test_value").unwrap();
        assert_eq!(
            storage.get("test_key").unwrap(),
            Some("test_value".to_string())
        );

        assert!(storage.has("test_key").unwrap());
        assert!(!storage.has("nonexistent").unwrap());

        assert!(storage.delete("test_key").unwrap());
        assert!(!storage.delete("test_key").unwrap());
        assert_eq!(storage.get("test_key").unwrap(), None);
    }

    #[test]
    fn test_memory_store_overwrite() {
        let storage = MemoryTokenStore::new();

        storage.set("key", "first").unwrap();
        storage.set("key", "second").unwrap();

        assert_eq!(storage.get("key").unwrap(), Some("second".to_string()));
    }
}
