//! Owner-authentication gate for key store access.
//!
//! Platform vaults can require that the device owner authenticated recently
//! before an item is read. `OwnerGate` models that window; `GatedKeyStore`
//! enforces it in front of any other store.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::store::KeyStore;
use mediavault_common::{Clock, Error, KeyId, KeyStoreOperation, Result, SensitiveBytes};

/// Time-limited proof that the device owner authenticated.
pub struct OwnerGate {
    validity: Duration,
    clock: Arc<dyn Clock>,
    opened_at: Mutex<Option<DateTime<Utc>>>,
}

impl OwnerGate {
    /// Create a closed gate whose openings last `validity`.
    pub fn new(validity: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            validity,
            clock,
            opened_at: Mutex::new(None),
        }
    }

    /// Record a successful owner authentication.
    pub fn open(&self) {
        let now = self.clock.now();
        *self.opened_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
        info!(valid_for_secs = self.validity.num_seconds(), "Owner gate opened");
    }

    /// Revoke access immediately.
    pub fn close(&self) {
        let mut opened_at = self.opened_at.lock().unwrap_or_else(|e| e.into_inner());
        if opened_at.take().is_some() {
            info!("Owner gate closed");
        }
    }

    /// Whether an owner authentication is currently valid.
    pub fn is_open(&self) -> bool {
        self.remaining().is_some()
    }

    /// Time left before the gate closes by itself.
    pub fn remaining(&self) -> Option<Duration> {
        let opened_at = *self.opened_at.lock().unwrap_or_else(|e| e.into_inner());
        let opened_at = opened_at?;
        let now = self.clock.now();

        // A clock that jumped backwards past the opening does not extend access.
        if now < opened_at {
            return None;
        }

        let remaining = opened_at + self.validity - now;
        (remaining > Duration::zero()).then_some(remaining)
    }
}

/// Key store wrapper that denies reads and writes while the gate is closed.
///
/// Deletion is not gated: removing a key never discloses it.
pub struct GatedKeyStore {
    inner: Arc<dyn KeyStore>,
    gate: Arc<OwnerGate>,
}

impl GatedKeyStore {
    /// Wrap `inner` behind `gate`.
    pub fn new(inner: Arc<dyn KeyStore>, gate: Arc<OwnerGate>) -> Self {
        Self { inner, gate }
    }

    /// The gate controlling this store.
    pub fn gate(&self) -> &Arc<OwnerGate> {
        &self.gate
    }

    fn check(&self, id: &KeyId) -> Result<()> {
        if self.gate.is_open() {
            Ok(())
        } else {
            debug!(key_id = %id, "Key store access denied: owner not authenticated");
            Err(Error::KeyStoreError(KeyStoreOperation::Denied))
        }
    }
}

impl KeyStore for GatedKeyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn save(&self, id: &KeyId, secret: &[u8]) -> Result<()> {
        self.check(id)?;
        self.inner.save(id, secret)
    }

    fn retrieve(&self, id: &KeyId) -> Result<Option<SensitiveBytes>> {
        self.check(id)?;
        self.inner.retrieve(id)
    }

    fn delete(&self, id: &KeyId) -> Result<()> {
        self.inner.delete(id)
    }

    fn contains(&self, id: &KeyId) -> Result<bool> {
        self.inner.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKeyStore;
    use mediavault_common::ManualClock;

    fn setup() -> (Arc<ManualClock>, GatedKeyStore) {
        let clock = Arc::new(ManualClock::default());
        let gate = Arc::new(OwnerGate::new(Duration::seconds(60), clock.clone()));
        let store = GatedKeyStore::new(Arc::new(MemoryKeyStore::new()), gate);
        (clock, store)
    }

    fn id() -> KeyId {
        KeyId::new("k").unwrap()
    }

    #[test]
    fn test_closed_gate_denies() {
        let (_, store) = setup();

        let err = store.save(&id(), b"x").unwrap_err();
        assert!(matches!(err, Error::KeyStoreError(KeyStoreOperation::Denied)));
        let err = store.retrieve(&id()).unwrap_err();
        assert!(matches!(err, Error::KeyStoreError(KeyStoreOperation::Denied)));
    }

    #[test]
    fn test_open_gate_allows() {
        let (_, store) = setup();
        store.gate().open();

        store.save(&id(), b"x").unwrap();
        assert_eq!(store.retrieve(&id()).unwrap().unwrap().as_bytes(), b"x");
    }

    #[test]
    fn test_gate_expires() {
        let (clock, store) = setup();
        store.gate().open();
        store.save(&id(), b"x").unwrap();

        clock.advance(Duration::seconds(59));
        assert!(store.gate().is_open());
        clock.advance(Duration::seconds(1));
        assert!(!store.gate().is_open());
        assert!(store.retrieve(&id()).is_err());
    }

    #[test]
    fn test_close_revokes() {
        let (_, store) = setup();
        store.gate().open();
        store.gate().close();

        assert!(store.retrieve(&id()).is_err());
    }

    #[test]
    fn test_clock_rollback_closes() {
        let (clock, store) = setup();
        store.gate().open();
        clock.advance(Duration::seconds(-5));

        assert!(!store.gate().is_open());
    }

    #[test]
    fn test_delete_and_contains_not_gated() {
        let (_, store) = setup();
        store.gate().open();
        store.save(&id(), b"x").unwrap();
        store.gate().close();

        assert!(store.contains(&id()).unwrap());
        store.delete(&id()).unwrap();
        assert!(!store.contains(&id()).unwrap());
    }
}
