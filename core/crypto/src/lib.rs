//! Cryptographic primitives for MediaVault.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Secure key management with automatic zeroization
//! - Explicit wiping of decrypted plaintext
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time operations for sensitive comparisons

pub mod aead;
mod encoding;
pub mod kdf;
pub mod keys;
pub mod wipe;

pub use aead::{decrypt, decrypt_bytes, encrypt, EncryptedBlob, BLOB_OVERHEAD, NONCE_SIZE, TAG_SIZE};
pub use kdf::{derive_key, verify_secret, KdfParams, DERIVED_KEY_LENGTH};
pub use keys::{DerivedKey, MasterKey, Salt, KEY_LENGTH, SALT_LENGTH};
pub use wipe::{wipe, wipe_vec, SecureBuffer};
