//! Common error types for MediaVault.
//!
//! Display strings are safe to show to a user: they never carry OS status
//! codes. The underlying I/O error stays reachable through `source()` for
//! diagnostics.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Key store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStoreOperation {
    Save,
    Retrieve,
    Delete,
    /// The store refused access because owner authentication is missing.
    Denied,
}

impl fmt::Display for KeyStoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Save => "save",
            Self::Retrieve => "retrieve",
            Self::Delete => "delete",
            Self::Denied => "access",
        };
        f.write_str(op)
    }
}

/// Top-level error type for MediaVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A fresh master key could not be generated or persisted.
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// An existing master key could not be loaded.
    #[error("Key retrieval failed: {0}")]
    KeyRetrievalFailed(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed for a reason other than integrity.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Integrity check failed: the data was corrupted or tampered with.
    #[error("Authentication failed: encrypted data is corrupted or was modified")]
    AuthenticationFailed,

    /// Reading a file failed.
    #[error("Failed to read file: {}", path.display())]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a file failed.
    #[error("Failed to write file: {}", path.display())]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The secure key store rejected or failed an operation.
    #[error("Key store {0} failed")]
    KeyStoreError(KeyStoreOperation),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A secure buffer was read after it had been wiped.
    #[error("Secure buffer has been released")]
    BufferReleased,

    /// The operation requires owner authentication first.
    #[error("Access denied: {0}")]
    AccessDenied(String),
}

impl Error {
    /// Build a key store error, keeping backend detail out of the message.
    ///
    /// The detail is emitted at debug level only.
    pub fn key_store(operation: KeyStoreOperation, detail: impl fmt::Display) -> Self {
        tracing::debug!(%operation, %detail, "key store backend failure");
        Self::KeyStoreError(operation)
    }

    /// Whether this error signals corrupted or tampered ciphertext.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
