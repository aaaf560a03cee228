//! Authenticated encryption of media payloads and files.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::key_manager::KeyManager;
use mediavault_common::{fs, Result};
use mediavault_crypto::{aead, EncryptedBlob, SecureBuffer};

/// Encrypts and decrypts payloads with the installation master key.
///
/// Stateless apart from the shared `KeyManager`; safe to call from any
/// thread.
pub struct EncryptionEngine {
    keys: Arc<KeyManager>,
}

impl EncryptionEngine {
    /// Create an engine using `keys` for the master key.
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// The key manager backing this engine.
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Encrypt a payload.
    ///
    /// # Postconditions
    /// - Every call uses a fresh random nonce, so identical plaintexts
    ///   produce different blobs of identical length
    /// - The master key is created on first use
    ///
    /// # Errors
    /// - `KeyGenerationFailed` / `KeyRetrievalFailed` from the key manager
    /// - `EncryptionFailed` if the cipher fails
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob> {
        let key = self.keys.get_or_create_key()?;
        let blob = aead::encrypt(&key, plaintext)?;
        debug!(size = plaintext.len(), blob_size = blob.len(), "Payload encrypted");
        Ok(blob)
    }

    /// Decrypt a blob.
    ///
    /// # Postconditions
    /// - Plaintext is released only after the tag verifies
    ///
    /// # Errors
    /// - `KeyRetrievalFailed` if no master key exists
    /// - `AuthenticationFailed` if the blob was corrupted or tampered with
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<SecureBuffer> {
        let key = self.keys.existing_key()?;
        let plaintext = aead::decrypt(&key, blob).inspect_err(|e| {
            if e.is_authentication_failure() {
                warn!(blob_size = blob.len(), "Blob failed integrity check");
            }
        })?;
        debug!(size = plaintext.len(), "Payload decrypted");
        Ok(plaintext)
    }

    /// Decrypt raw bytes read from storage.
    ///
    /// # Errors
    /// - `DecryptionFailed` if the bytes are too short to be a blob
    /// - Otherwise as `decrypt`
    pub fn decrypt_bytes(&self, bytes: &[u8]) -> Result<SecureBuffer> {
        let blob = EncryptedBlob::from_bytes(bytes.to_vec())?;
        self.decrypt(&blob)
    }

    /// Encrypt the file at `source` into `destination`.
    ///
    /// # Postconditions
    /// - `destination` holds either its previous content or the complete
    ///   blob; a failed run never leaves a partial file behind
    /// - The plaintext read from `source` is wiped before returning
    ///
    /// # Returns
    /// Number of bytes written.
    ///
    /// # Errors
    /// - `FileReadError` / `FileWriteError` on I/O failure
    /// - As `encrypt`
    pub fn encrypt_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        debug!(source = %source.display(), "Encrypting file");

        let plaintext = SecureBuffer::new(fs::read_file(source)?);
        let blob = self.encrypt(plaintext.read()?)?;
        plaintext.release();

        fs::atomic_write(destination, blob.as_bytes())?;

        info!(destination = %destination.display(), size = blob.len(), "File encrypted");
        Ok(blob.len() as u64)
    }

    /// Decrypt the file at `source` into `destination`.
    ///
    /// # Postconditions
    /// - Nothing is written unless the whole blob authenticates
    /// - `destination` is replaced atomically
    ///
    /// # Returns
    /// Number of plaintext bytes written.
    ///
    /// # Errors
    /// - `FileReadError` / `FileWriteError` on I/O failure
    /// - As `decrypt_bytes`
    pub fn decrypt_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        debug!(source = %source.display(), "Decrypting file");

        let blob = EncryptedBlob::from_bytes(fs::read_file(source)?)?;
        let plaintext = self.decrypt(&blob)?;
        let written = plaintext.len() as u64;

        let result = fs::atomic_write(destination, plaintext.read()?);
        plaintext.release();
        result?;

        info!(destination = %destination.display(), size = written, "File decrypted");
        Ok(written)
    }
}

impl From<Arc<KeyManager>> for EncryptionEngine {
    fn from(keys: Arc<KeyManager>) -> Self {
        Self::new(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_manager::DEFAULT_MASTER_KEY_ID;
    use mediavault_common::{Error, KeyId};
    use mediavault_crypto::{BLOB_OVERHEAD, NONCE_SIZE, TAG_SIZE};
    use mediavault_keystore::{KeyStore, MemoryKeyStore};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn engine() -> EncryptionEngine {
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        let keys = KeyManager::new(store, KeyId::new(DEFAULT_MASTER_KEY_ID).unwrap());
        EncryptionEngine::new(Arc::new(keys))
    }

    #[test]
    fn test_roundtrip() {
        let engine = engine();
        let blob = engine.encrypt(b"holiday.jpg bytes").unwrap();
        let plaintext = engine.decrypt(&blob).unwrap();

        assert_eq!(plaintext.read().unwrap(), b"holiday.jpg bytes");
    }

    #[test]
    fn test_same_payload_twice_differs() {
        let engine = engine();
        let payload = [0x42u8; 10];

        let first = engine.encrypt(&payload).unwrap();
        let second = engine.encrypt(&payload).unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(first.len(), payload.len() + BLOB_OVERHEAD);
        assert_ne!(first.as_bytes(), second.as_bytes());
        assert_eq!(engine.decrypt(&first).unwrap().read().unwrap(), &payload);
        assert_eq!(engine.decrypt(&second).unwrap().read().unwrap(), &payload);
    }

    #[test]
    fn test_corrupted_first_byte() {
        let engine = engine();
        let mut bytes = engine.encrypt(&[1u8; 10]).unwrap().into_bytes();
        bytes[0] ^= 0x80;

        let err = engine.decrypt_bytes(&bytes).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed));
    }

    #[test]
    fn test_tamper_in_each_component() {
        let engine = engine();
        let bytes = engine.encrypt(b"0123456789").unwrap().into_bytes();

        // One position each in nonce, ciphertext and tag.
        for position in [3, NONCE_SIZE + 2, bytes.len() - TAG_SIZE + 4] {
            let mut tampered = bytes.clone();
            tampered[position] ^= 0x01;
            let err = engine.decrypt_bytes(&tampered).unwrap_err();
            assert!(matches!(err, Error::AuthenticationFailed), "position {}", position);
        }
    }

    #[test]
    fn test_decrypt_without_key_does_not_create_one() {
        let engine = engine();
        let foreign = aead::encrypt(&mediavault_crypto::MasterKey::generate(), b"x").unwrap();

        let err = engine.decrypt(&foreign).unwrap_err();
        assert!(matches!(err, Error::KeyRetrievalFailed(_)));
        assert!(!engine.key_manager().has_cached_key());
    }

    #[test]
    fn test_decrypt_after_cache_invalidation() {
        let engine = engine();
        let blob = engine.encrypt(b"persisted key").unwrap();

        engine.key_manager().invalidate_cache();
        assert_eq!(engine.decrypt(&blob).unwrap().read().unwrap(), b"persisted key");
    }

    #[test]
    fn test_encrypt_decrypt_file() {
        let temp = TempDir::new().unwrap();
        let engine = engine();
        let source = temp.path().join("photo.jpg");
        let vaulted = temp.path().join("photo.vault");
        let restored = temp.path().join("photo.out.jpg");
        std::fs::write(&source, b"\xFF\xD8\xFF\xE0 jpeg data").unwrap();

        let written = engine.encrypt_file(&source, &vaulted).unwrap();
        assert_eq!(written, std::fs::metadata(&vaulted).unwrap().len());
        assert_ne!(std::fs::read(&vaulted).unwrap(), std::fs::read(&source).unwrap());

        let plain = engine.decrypt_file(&vaulted, &restored).unwrap();
        assert_eq!(plain, std::fs::metadata(&source).unwrap().len());
        assert_eq!(std::fs::read(&restored).unwrap(), std::fs::read(&source).unwrap());
    }

    #[test]
    fn test_encrypt_missing_source_is_read_error() {
        let temp = TempDir::new().unwrap();
        let engine = engine();

        let err = engine
            .encrypt_file(&temp.path().join("missing"), &temp.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, Error::FileReadError { .. }));
        assert!(!temp.path().join("out").exists());
    }

    #[test]
    fn test_write_failure_leaves_no_destination() {
        let temp = TempDir::new().unwrap();
        let engine = engine();
        let source = temp.path().join("in");
        std::fs::write(&source, b"data").unwrap();
        let destination = temp.path().join("no-such-dir").join("out");

        let err = engine.encrypt_file(&source, &destination).unwrap_err();
        assert!(matches!(err, Error::FileWriteError { .. }));
        assert!(!destination.exists());
    }

    #[test]
    fn test_tampered_file_leaves_destination_untouched() {
        let temp = TempDir::new().unwrap();
        let engine = engine();
        let source = temp.path().join("in");
        let vaulted = temp.path().join("in.vault");
        let destination = temp.path().join("out");
        std::fs::write(&source, b"original").unwrap();
        std::fs::write(&destination, b"previous").unwrap();
        engine.encrypt_file(&source, &vaulted).unwrap();

        let mut bytes = std::fs::read(&vaulted).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&vaulted, &bytes).unwrap();

        let err = engine.decrypt_file(&vaulted, &destination).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed));
        assert_eq!(std::fs::read(&destination).unwrap(), b"previous");
    }

    #[test]
    fn test_truncated_file_is_decryption_failure() {
        let temp = TempDir::new().unwrap();
        let engine = engine();
        let vaulted = temp.path().join("short.vault");
        std::fs::write(&vaulted, [0u8; 8]).unwrap();

        let err = engine
            .decrypt_file(&vaulted, &temp.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, Error::DecryptionFailed(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_engine_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let engine = engine();
            let blob = engine.encrypt(&payload).unwrap();
            let decrypted = engine.decrypt(&blob).unwrap();
            prop_assert_eq!(decrypted.read().unwrap(), payload.as_slice());
        }
    }
}
