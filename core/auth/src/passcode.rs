//! Passcode setup and verification.
//!
//! This is a pure verification primitive: it does not consult or update
//! the lockout guard. `UnlockCoordinator` couples the two.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::record::PasscodeRecord;
use mediavault_common::{Error, KeyId, Result};
use mediavault_crypto::KdfParams;
use mediavault_keystore::KeyStore;

/// Key store identifier of the passcode record.
pub const PASSCODE_RECORD_ID: &str = "mediavault.passcode";

/// Length rules for passcodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasscodePolicy {
    /// Fewest digits accepted.
    pub min_digits: usize,
    /// Most digits accepted.
    pub max_digits: usize,
}

impl PasscodePolicy {
    /// Check the policy itself is coherent.
    pub fn validate(&self) -> Result<()> {
        if self.min_digits == 0 || self.min_digits > self.max_digits {
            return Err(Error::InvalidInput(format!(
                "Invalid passcode policy: {}..={} digits",
                self.min_digits, self.max_digits
            )));
        }
        Ok(())
    }

    /// Check a candidate against the policy.
    ///
    /// The error message never echoes the candidate.
    pub fn check(&self, candidate: &str) -> Result<()> {
        if !candidate.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(
                "Passcode must contain only digits".to_string(),
            ));
        }
        let len = candidate.len();
        if len < self.min_digits || len > self.max_digits {
            return Err(Error::InvalidInput(format!(
                "Passcode must be {}-{} digits",
                self.min_digits, self.max_digits
            )));
        }
        Ok(())
    }

    /// Whether a candidate satisfies the policy.
    pub fn accepts(&self, candidate: &str) -> bool {
        self.check(candidate).is_ok()
    }
}

impl Default for PasscodePolicy {
    fn default() -> Self {
        Self {
            min_digits: 4,
            max_digits: 8,
        }
    }
}

/// Sets, verifies and removes the device passcode.
///
/// Holds no passcode state itself: the salted verifier lives in the key
/// store. Calls are serialized on an internal lock so a set cannot
/// interleave with a verify.
pub struct PasscodeAuthenticator {
    store: Arc<dyn KeyStore>,
    record_id: KeyId,
    policy: PasscodePolicy,
    kdf: KdfParams,
    lock: Mutex<()>,
}

impl PasscodeAuthenticator {
    /// Create an authenticator persisting its record in `store`.
    ///
    /// # Errors
    /// - `InvalidInput` if the policy or KDF parameters are invalid
    pub fn new(store: Arc<dyn KeyStore>, policy: PasscodePolicy, kdf: KdfParams) -> Result<Self> {
        policy.validate()?;
        kdf.validate()?;
        Ok(Self {
            store,
            record_id: KeyId::new(PASSCODE_RECORD_ID)?,
            policy,
            kdf,
            lock: Mutex::new(()),
        })
    }

    /// The active passcode policy.
    pub fn policy(&self) -> &PasscodePolicy {
        &self.policy
    }

    fn serialize(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load_record(&self) -> Result<Option<PasscodeRecord>> {
        match self.store.retrieve(&self.record_id)? {
            Some(bytes) => PasscodeRecord::from_bytes(bytes.as_bytes()).map(Some),
            None => Ok(None),
        }
    }

    /// Configure a new passcode, replacing any existing one.
    ///
    /// # Postconditions
    /// - A fresh salt is generated, so setting the same passcode twice
    ///   stores unrelated derived keys
    /// - On error the previous record (if any) is left as it was
    ///
    /// # Errors
    /// - `InvalidInput` if the candidate violates the policy
    /// - `KeyStoreError` if the record cannot be saved
    pub fn set_passcode(&self, candidate: &str) -> Result<()> {
        self.policy.check(candidate)?;
        let _guard = self.serialize();

        let record = PasscodeRecord::create(candidate, &self.kdf)?;
        let bytes = record.to_bytes()?;
        self.store.save(&self.record_id, &bytes)?;

        info!("Passcode set");
        Ok(())
    }

    /// Check a candidate against the stored passcode.
    ///
    /// # Returns
    /// - `Ok(false)` if no passcode is configured, the candidate violates
    ///   the policy, or it does not match
    ///
    /// # Errors
    /// - `KeyStoreError` / `Serialization` if the record cannot be loaded
    pub fn verify_passcode(&self, candidate: &str) -> Result<bool> {
        let _guard = self.serialize();

        let Some(record) = self.load_record()? else {
            debug!("Passcode verification without a configured passcode");
            return Ok(false);
        };

        // Malformed candidates can never match; skip the KDF.
        if !self.policy.accepts(candidate) {
            return Ok(false);
        }

        let matched = record.matches(candidate)?;
        debug!(matched, "Passcode verified");
        Ok(matched)
    }

    /// Replace the passcode after verifying the current one.
    ///
    /// # Returns
    /// - `Ok(false)` if `current` does not match; nothing is changed
    pub fn change_passcode(&self, current: &str, new: &str) -> Result<bool> {
        self.policy.check(new)?;
        if !self.verify_passcode(current)? {
            return Ok(false);
        }
        self.set_passcode(new)?;
        Ok(true)
    }

    /// Remove the passcode record.
    pub fn remove_passcode(&self) -> Result<()> {
        let _guard = self.serialize();
        self.store.delete(&self.record_id)?;
        info!("Passcode removed");
        Ok(())
    }

    /// Whether a passcode is configured.
    pub fn has_passcode(&self) -> Result<bool> {
        let _guard = self.serialize();
        self.store.contains(&self.record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediavault_common::{KeyStoreOperation, SensitiveBytes};
    use mediavault_keystore::MemoryKeyStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn setup() -> (Arc<MemoryKeyStore>, PasscodeAuthenticator) {
        let store = Arc::new(MemoryKeyStore::new());
        let auth =
            PasscodeAuthenticator::new(store.clone(), PasscodePolicy::default(), fast_params())
                .unwrap();
        (store, auth)
    }

    fn stored_record(store: &MemoryKeyStore) -> PasscodeRecord {
        let id = KeyId::new(PASSCODE_RECORD_ID).unwrap();
        let bytes = store.retrieve(&id).unwrap().unwrap();
        PasscodeRecord::from_bytes(bytes.as_bytes()).unwrap()
    }

    #[test]
    fn test_set_and_verify() {
        let (_, auth) = setup();
        auth.set_passcode("123456").unwrap();

        assert!(auth.verify_passcode("123456").unwrap());
        assert!(!auth.verify_passcode("000000").unwrap());
    }

    #[test]
    fn test_verify_without_passcode() {
        let (_, auth) = setup();
        assert!(!auth.has_passcode().unwrap());
        assert!(!auth.verify_passcode("123456").unwrap());
    }

    #[test]
    fn test_policy_enforced_on_set() {
        let (store, auth) = setup();

        for bad in ["123", "123456789", "12a456", "", "１２３４"] {
            let err = auth.set_passcode(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "accepted {:?}", bad);
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_policy_violation_on_verify_is_mismatch() {
        let (_, auth) = setup();
        auth.set_passcode("1234").unwrap();

        assert!(!auth.verify_passcode("abcd").unwrap());
        assert!(!auth.verify_passcode("12").unwrap());
    }

    #[test]
    fn test_salt_and_key_change_on_every_set() {
        let (store, auth) = setup();

        auth.set_passcode("123456").unwrap();
        let first = stored_record(&store);
        auth.set_passcode("123456").unwrap();
        let second = stored_record(&store);

        assert_ne!(first.salt, second.salt);
        assert!(!first.derived_key.ct_eq(&second.derived_key));
        assert!(auth.verify_passcode("123456").unwrap());
    }

    #[test]
    fn test_passcode_not_stored() {
        let (store, auth) = setup();
        auth.set_passcode("24681357").unwrap();

        let id = KeyId::new(PASSCODE_RECORD_ID).unwrap();
        let raw = store.retrieve(&id).unwrap().unwrap();
        let text = String::from_utf8_lossy(raw.as_bytes());
        assert!(!text.contains("24681357"));
    }

    #[test]
    fn test_change_passcode() {
        let (_, auth) = setup();
        auth.set_passcode("1111").unwrap();

        assert!(!auth.change_passcode("2222", "3333").unwrap());
        assert!(auth.verify_passcode("1111").unwrap());

        assert!(auth.change_passcode("1111", "3333").unwrap());
        assert!(auth.verify_passcode("3333").unwrap());
        assert!(!auth.verify_passcode("1111").unwrap());
    }

    #[test]
    fn test_remove_passcode() {
        let (_, auth) = setup();
        auth.set_passcode("1234").unwrap();
        assert!(auth.has_passcode().unwrap());

        auth.remove_passcode().unwrap();
        assert!(!auth.has_passcode().unwrap());
        assert!(!auth.verify_passcode("1234").unwrap());
    }

    #[derive(Default)]
    struct FailingSaveStore {
        inner: MemoryKeyStore,
        fail: AtomicBool,
    }

    impl KeyStore for FailingSaveStore {
        fn name(&self) -> &str {
            "failing"
        }
        fn save(&self, id: &KeyId, secret: &[u8]) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::KeyStoreError(KeyStoreOperation::Save));
            }
            self.inner.save(id, secret)
        }
        fn retrieve(&self, id: &KeyId) -> Result<Option<SensitiveBytes>> {
            self.inner.retrieve(id)
        }
        fn delete(&self, id: &KeyId) -> Result<()> {
            self.inner.delete(id)
        }
        fn contains(&self, id: &KeyId) -> Result<bool> {
            self.inner.contains(id)
        }
    }

    #[test]
    fn test_failed_save_keeps_previous_passcode() {
        let store = Arc::new(FailingSaveStore::default());
        let auth =
            PasscodeAuthenticator::new(store.clone(), PasscodePolicy::default(), fast_params())
                .unwrap();
        auth.set_passcode("1234").unwrap();

        store.fail.store(true, Ordering::SeqCst);
        assert!(auth.set_passcode("5678").is_err());

        assert!(auth.verify_passcode("1234").unwrap());
        assert!(!auth.verify_passcode("5678").unwrap());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let store = Arc::new(MemoryKeyStore::new());
        let policy = PasscodePolicy {
            min_digits: 6,
            max_digits: 4,
        };
        assert!(PasscodeAuthenticator::new(store, policy, fast_params()).is_err());
    }
}
