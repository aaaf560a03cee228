//! Persisted passcode verifier.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use mediavault_common::{Error, Result};
use mediavault_crypto::{derive_key, verify_secret, DerivedKey, KdfParams, Salt};

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

/// Salted verifier for a passcode.
///
/// Holds only the salt, the derived key and the parameters needed to
/// re-derive it. The passcode itself is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasscodeRecord {
    /// Record format version.
    pub version: u32,
    /// Fresh random salt, generated on every set.
    pub salt: Salt,
    /// Argon2id output for (passcode, salt).
    pub derived_key: DerivedKey,
    /// Parameters used to derive `derived_key`.
    pub kdf: KdfParams,
}

impl PasscodeRecord {
    /// Derive a new record from a passcode with a freshly generated salt.
    pub fn create(passcode: &str, kdf: &KdfParams) -> Result<Self> {
        let salt = Salt::generate();
        let derived_key = derive_key(passcode.as_bytes(), &salt, kdf)?;
        Ok(Self {
            version: RECORD_VERSION,
            salt,
            derived_key,
            kdf: kdf.clone(),
        })
    }

    /// Re-derive with the stored salt and parameters and compare in
    /// constant time.
    pub fn matches(&self, candidate: &str) -> Result<bool> {
        verify_secret(candidate.as_bytes(), &self.salt, &self.kdf, &self.derived_key)
    }

    /// Serialize for the key store. The buffer is wiped on drop.
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        serde_json::to_vec(self)
            .map(Zeroizing::new)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from key store bytes.
    ///
    /// # Errors
    /// - `Serialization` if the bytes are not a record or the version is
    ///   unknown
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        if record.version != RECORD_VERSION {
            return Err(Error::Serialization(format!(
                "Unsupported passcode record version: {}",
                record.version
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_record_matches() {
        let record = PasscodeRecord::create("123456", &fast_params()).unwrap();

        assert!(record.matches("123456").unwrap());
        assert!(!record.matches("000000").unwrap());
    }

    #[test]
    fn test_record_serialization_excludes_passcode() {
        let record = PasscodeRecord::create("987654", &fast_params()).unwrap();
        let bytes = record.to_bytes().unwrap();
        let json = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(!json.contains("987654"));
        assert!(json.contains("\"salt\""));
        assert!(json.contains("\"derived_key\""));

        let restored = PasscodeRecord::from_bytes(&bytes).unwrap();
        assert!(restored.matches("987654").unwrap());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut record = PasscodeRecord::create("1234", &fast_params()).unwrap();
        record.version = 99;
        let bytes = serde_json::to_vec(&record).unwrap();

        assert!(matches!(
            PasscodeRecord::from_bytes(&bytes),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(PasscodeRecord::from_bytes(b"not json").is_err());
    }
}
