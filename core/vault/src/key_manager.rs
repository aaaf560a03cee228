//! Master key lifecycle.
//!
//! The master key lives in the key store and is cached in memory after the
//! first load. All cache transitions happen under a single mutex that is
//! held across the key store round trip, so concurrent first calls cannot
//! generate two different keys.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use mediavault_common::{Error, KeyId, Result};
use mediavault_crypto::MasterKey;
use mediavault_keystore::KeyStore;

/// Key store identifier used when none is configured.
pub const DEFAULT_MASTER_KEY_ID: &str = "mediavault.master-key";

/// Owner of the installation's master key.
///
/// Construct one per installation at the composition root and share it by
/// `Arc`. Keys are handed out as `Arc<MasterKey>`; the cached value is
/// replaced or cleared wholesale, never mutated, and the key bytes are
/// zeroized once the last handle is dropped.
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    key_id: KeyId,
    cache: Mutex<Option<Arc<MasterKey>>>,
}

impl KeyManager {
    /// Create a key manager backed by `store`, addressing the key as `key_id`.
    pub fn new(store: Arc<dyn KeyStore>, key_id: KeyId) -> Self {
        Self {
            store,
            key_id,
            cache: Mutex::new(None),
        }
    }

    /// Identifier of the master key in the key store.
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Whether a key is currently cached in memory.
    pub fn has_cached_key(&self) -> bool {
        self.lock_cache().is_some()
    }

    // The cache only ever holds a complete value, so a panic elsewhere
    // cannot leave it half-written; recovering from poison is sound.
    fn lock_cache(&self) -> MutexGuard<'_, Option<Arc<MasterKey>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the master key, creating and persisting it on first use.
    ///
    /// # Postconditions
    /// - The cache is populated only after the key is known to be persisted
    ///
    /// # Errors
    /// - `KeyRetrievalFailed` if the key store cannot be read or holds a
    ///   malformed key
    /// - `KeyGenerationFailed` if a new key cannot be persisted; nothing is
    ///   cached in that case
    pub fn get_or_create_key(&self) -> Result<Arc<MasterKey>> {
        let mut cache = self.lock_cache();
        if let Some(key) = cache.as_ref() {
            return Ok(Arc::clone(key));
        }

        let key = match self.load_from_store()? {
            Some(key) => {
                debug!(key_id = %self.key_id, "Master key loaded from key store");
                key
            }
            None => {
                let key = MasterKey::generate();
                self.store
                    .save(&self.key_id, key.as_bytes())
                    .map_err(|e| Error::KeyGenerationFailed(e.to_string()))?;
                info!(key_id = %self.key_id, store = self.store.name(), "Master key generated");
                key
            }
        };

        let key = Arc::new(key);
        *cache = Some(Arc::clone(&key));
        Ok(key)
    }

    /// Return the existing master key without ever generating one.
    ///
    /// Used on read paths, where minting a fresh key could only turn a
    /// missing key into a misleading integrity failure.
    ///
    /// # Errors
    /// - `KeyRetrievalFailed` if no key exists or it cannot be loaded
    pub fn existing_key(&self) -> Result<Arc<MasterKey>> {
        let mut cache = self.lock_cache();
        if let Some(key) = cache.as_ref() {
            return Ok(Arc::clone(key));
        }

        let key = self
            .load_from_store()?
            .ok_or_else(|| Error::KeyRetrievalFailed("No master key exists".to_string()))?;

        let key = Arc::new(key);
        *cache = Some(Arc::clone(&key));
        Ok(key)
    }

    fn load_from_store(&self) -> Result<Option<MasterKey>> {
        let stored = self
            .store
            .retrieve(&self.key_id)
            .map_err(|e| Error::KeyRetrievalFailed(e.to_string()))?;

        match stored {
            Some(bytes) => MasterKey::from_slice(bytes.as_bytes())
                .map(Some)
                .map_err(|_| {
                    warn!(key_id = %self.key_id, "Stored master key has invalid length");
                    Error::KeyRetrievalFailed("Stored master key is malformed".to_string())
                }),
            None => Ok(None),
        }
    }

    /// Drop the cached key without touching the key store.
    pub fn invalidate_cache(&self) {
        if self.lock_cache().take().is_some() {
            debug!(key_id = %self.key_id, "Master key cache invalidated");
        }
    }

    /// Delete the key from the key store, then clear the cache.
    ///
    /// # Errors
    /// - `KeyStoreError` if deletion fails; the cache is left untouched so
    ///   the key stays usable until the caller retries
    pub fn delete_key(&self) -> Result<()> {
        let mut cache = self.lock_cache();
        self.store.delete(&self.key_id)?;
        *cache = None;
        info!(key_id = %self.key_id, "Master key deleted");
        Ok(())
    }
}
