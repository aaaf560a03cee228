//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks. Numeric
//! passcodes have very little entropy, so the memory cost carries most of
//! the brute-force resistance; the lockout guard covers the rest.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::keys::{DerivedKey, Salt};
use mediavault_common::{Error, Result};

/// Length of keys derived from a passcode.
pub const DERIVED_KEY_LENGTH: usize = 32;

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    ///
    /// These parameters provide a balance between security and usability,
    /// targeting approximately 0.5-1 second of derivation time.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// Create moderate parameters for mobile devices.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Look up a named preset.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "interactive" => Some(Self::interactive()),
            "moderate" => Some(Self::moderate()),
            "sensitive" => Some(Self::sensitive()),
            _ => None,
        }
    }

    /// Check that Argon2 accepts these parameters.
    pub fn validate(&self) -> Result<()> {
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(&self) -> Result<Params> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(DERIVED_KEY_LENGTH),
        )
        .map_err(|e| Error::InvalidInput(format!("Invalid KDF parameters: {}", e)))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::moderate()
    }
}

/// Derive a key from a secret and salt using Argon2id.
///
/// # Preconditions
/// - `secret` must not be empty
///
/// # Postconditions
/// - Returns DERIVED_KEY_LENGTH bytes, deterministic in (secret, salt, params)
///
/// # Errors
/// - Returns error if secret is empty
/// - Returns error if Argon2id parameters are invalid
///
/// # Security
/// - The secret is not stored or logged
/// - Intermediate output is zeroized
pub fn derive_key(secret: &[u8], salt: &Salt, params: &KdfParams) -> Result<DerivedKey> {
    if secret.is_empty() {
        return Err(Error::InvalidInput("Secret cannot be empty".to_string()));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);

    let mut output = Zeroizing::new([0u8; DERIVED_KEY_LENGTH]);
    argon2
        .hash_password_into(secret, salt.as_bytes(), &mut output[..])
        .map_err(|e| Error::InvalidInput(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey::from_bytes(output.to_vec()))
}

/// Check that `secret` derives `expected` under the given salt and params.
///
/// The final comparison is constant-time.
pub fn verify_secret(
    secret: &[u8],
    salt: &Salt,
    params: &KdfParams,
    expected: &DerivedKey,
) -> Result<bool> {
    let derived = derive_key(secret, salt, params)?;
    Ok(derived.ct_eq(expected))
}
