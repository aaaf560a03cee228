//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation.
//!
//! Blob layout: `nonce (24) || ciphertext (n) || tag (16)`.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};
use std::fmt;

use crate::keys::MasterKey;
use crate::wipe::SecureBuffer;
use mediavault_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Bytes added to every plaintext by `encrypt`.
pub const BLOB_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// At-rest form of an encrypted payload.
///
/// Always at least `BLOB_OVERHEAD` bytes long; the nonce length is implicit.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob(Vec<u8>);

impl EncryptedBlob {
    /// Parse bytes read from storage.
    ///
    /// # Errors
    /// - `DecryptionFailed` if the input is too short to hold a nonce and tag
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < BLOB_OVERHEAD {
            return Err(Error::DecryptionFailed(format!(
                "Blob too short: {} bytes, need at least {}",
                bytes.len(),
                BLOB_OVERHEAD
            )));
        }
        Ok(Self(bytes))
    }

    /// Raw blob bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into raw bytes for writing to storage.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Total length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: a blob carries at least a nonce and a tag.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length of the plaintext this blob decrypts to.
    pub fn plaintext_len(&self) -> usize {
        self.0.len() - BLOB_OVERHEAD
    }

    /// The per-encryption nonce.
    pub fn nonce(&self) -> &[u8] {
        &self.0[..NONCE_SIZE]
    }

    /// The encrypted payload without nonce and tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.0[NONCE_SIZE..self.0.len() - TAG_SIZE]
    }

    /// The Poly1305 authentication tag.
    pub fn tag(&self) -> &[u8] {
        &self.0[self.0.len() - TAG_SIZE..]
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlob({} bytes)", self.0.len())
    }
}

/// Encrypt plaintext using XChaCha20-Poly1305.
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is freshly drawn from the OS CSPRNG on every call, so two
///   encryptions of the same plaintext never produce the same blob
/// - The blob length is plaintext length + BLOB_OVERHEAD
///
/// # Errors
/// - `EncryptionFailed` if the cipher rejects the input
pub fn encrypt(key: &MasterKey, plaintext: &[u8]) -> Result<EncryptedBlob> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

    // Prepend nonce to ciphertext
    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    Ok(EncryptedBlob(blob))
}

/// Decrypt a blob using XChaCha20-Poly1305.
///
/// # Postconditions
/// - The tag is verified before any plaintext is released
/// - Returned plaintext is wiped when the buffer is dropped or released
///
/// # Errors
/// - `AuthenticationFailed` if the tag does not verify (wrong key,
///   corruption, tampering). No partial plaintext is ever returned.
pub fn decrypt(key: &MasterKey, blob: &EncryptedBlob) -> Result<SecureBuffer> {
    let (nonce_bytes, sealed) = blob.0.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    // The aead error is opaque; with a well-formed blob the only failure is
    // tag verification.
    cipher
        .decrypt(nonce, sealed)
        .map(SecureBuffer::new)
        .map_err(|_| Error::AuthenticationFailed)
}

/// Parse raw bytes and decrypt them.
///
/// # Errors
/// - `DecryptionFailed` if the input is too short to be a blob
/// - `AuthenticationFailed` if the tag does not verify
pub fn decrypt_bytes(key: &MasterKey, bytes: &[u8]) -> Result<SecureBuffer> {
    let blob = EncryptedBlob::from_bytes(bytes.to_vec())?;
    decrypt(key, &blob)
}
