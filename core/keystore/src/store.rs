//! Key store trait definition.

use mediavault_common::{KeyId, Result, SensitiveBytes};

/// Access-controlled repository of raw secret bytes.
///
/// Mirrors a platform secret vault: entries are addressed by a stable
/// identifier and are opaque to the store. Implementations must be safe to
/// share between threads and must never log entry contents.
pub trait KeyStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Store `secret` under `id`, replacing any existing entry.
    ///
    /// # Errors
    /// - `KeyStoreError(Save)` if the backend fails
    /// - `KeyStoreError(Denied)` if access requires owner authentication
    fn save(&self, id: &KeyId, secret: &[u8]) -> Result<()>;

    /// Load the entry stored under `id`.
    ///
    /// # Returns
    /// `None` if no entry exists.
    ///
    /// # Errors
    /// - `KeyStoreError(Retrieve)` if the backend fails
    /// - `KeyStoreError(Denied)` if access requires owner authentication
    fn retrieve(&self, id: &KeyId) -> Result<Option<SensitiveBytes>>;

    /// Remove the entry stored under `id`. Removing a missing entry succeeds.
    ///
    /// # Errors
    /// - `KeyStoreError(Delete)` if the backend fails
    fn delete(&self, id: &KeyId) -> Result<()>;

    /// Check whether an entry exists without reading it.
    fn contains(&self, id: &KeyId) -> Result<bool>;
}
