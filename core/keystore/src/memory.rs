//! In-memory key store for testing.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::store::KeyStore;
use mediavault_common::{Error, KeyId, KeyStoreOperation, Result, SensitiveBytes};

/// In-memory key store.
///
/// Useful for testing and development. Entries are zeroized when they are
/// replaced, deleted, or when the store is dropped.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: RwLock<HashMap<KeyId, SensitiveBytes>>,
}

impl MemoryKeyStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
        operation: KeyStoreOperation,
    ) -> Result<RwLockReadGuard<'_, HashMap<KeyId, SensitiveBytes>>> {
        self.entries
            .read()
            .map_err(|_| Error::key_store(operation, "memory store lock poisoned"))
    }

    fn write(
        &self,
        operation: KeyStoreOperation,
    ) -> Result<RwLockWriteGuard<'_, HashMap<KeyId, SensitiveBytes>>> {
        self.entries
            .write()
            .map_err(|_| Error::key_store(operation, "memory store lock poisoned"))
    }
}

impl KeyStore for MemoryKeyStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn save(&self, id: &KeyId, secret: &[u8]) -> Result<()> {
        self.write(KeyStoreOperation::Save)?
            .insert(id.clone(), SensitiveBytes::from_slice(secret));
        Ok(())
    }

    fn retrieve(&self, id: &KeyId) -> Result<Option<SensitiveBytes>> {
        Ok(self.read(KeyStoreOperation::Retrieve)?.get(id).cloned())
    }

    fn delete(&self, id: &KeyId) -> Result<()> {
        self.write(KeyStoreOperation::Delete)?.remove(id);
        Ok(())
    }

    fn contains(&self, id: &KeyId) -> Result<bool> {
        Ok(self.read(KeyStoreOperation::Retrieve)?.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> KeyId {
        KeyId::new(name).unwrap()
    }

    #[test]
    fn test_save_and_retrieve() {
        let store = MemoryKeyStore::new();
        store.save(&id("a"), b"secret").unwrap();

        let value = store.retrieve(&id("a")).unwrap().unwrap();
        assert_eq!(value.as_bytes(), b"secret");
        assert!(store.contains(&id("a")).unwrap());
    }

    #[test]
    fn test_retrieve_missing() {
        let store = MemoryKeyStore::new();
        assert!(store.retrieve(&id("missing")).unwrap().is_none());
        assert!(!store.contains(&id("missing")).unwrap());
    }

    #[test]
    fn test_save_overwrites() {
        let store = MemoryKeyStore::new();
        store.save(&id("a"), b"one").unwrap();
        store.save(&id("a"), b"two").unwrap();

        assert_eq!(store.retrieve(&id("a")).unwrap().unwrap().as_bytes(), b"two");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryKeyStore::new();
        store.save(&id("a"), b"secret").unwrap();

        store.delete(&id("a")).unwrap();
        store.delete(&id("a")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_len_after_poisoned_lock() {
        let store = MemoryKeyStore::new();
        store.save(&id("a"), b"secret").unwrap();

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.entries.write().unwrap();
            panic!("writer panicked");
        }));

        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }
}
