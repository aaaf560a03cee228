//! Persistence for lockout state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use mediavault_common::{fs, Error, Result};

/// Failed-attempt counter and lockout deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    /// Consecutive failed attempts since the last reset.
    pub failed_attempts: u32,
    /// Wall-clock end of the current lockout, if any.
    pub lockout_until: Option<DateTime<Utc>>,
}

/// Durable home for `LockoutState`.
///
/// Implementations must make `save` atomic: a reader sees either the
/// previous state or the new one.
pub trait LockoutStore: Send + Sync {
    /// Load the persisted state, or `None` if nothing was ever saved.
    ///
    /// # Errors
    /// - `Serialization` if persisted data exists but cannot be parsed
    fn load(&self) -> Result<Option<LockoutState>>;

    /// Persist `state`, replacing what was there.
    fn save(&self, state: &LockoutState) -> Result<()>;
}

/// In-memory store. Shared by `Arc` it survives guard re-creation, which
/// is how tests model a process restart.
#[derive(Debug, Default)]
pub struct MemoryLockoutStore {
    state: Mutex<Option<LockoutState>>,
}

impl MemoryLockoutStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockoutStore for MemoryLockoutStore {
    fn load(&self) -> Result<Option<LockoutState>> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, state: &LockoutState) -> Result<()> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        Ok(())
    }
}

/// JSON file store, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileLockoutStore {
    path: PathBuf,
}

impl FileLockoutStore {
    /// Store state at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LockoutStore for FileLockoutStore {
    fn load(&self) -> Result<Option<LockoutState>> {
        let Some(bytes) = fs::read_optional(&self.path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Serialization(format!("Lockout state: {}", e)))
    }

    fn save(&self, state: &LockoutState) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(state).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::atomic_write(&self.path, &json)?;
        debug!(path = %self.path.display(), "Lockout state persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileLockoutStore::new(temp.path().join("lockout.json"));
        assert!(store.load().unwrap().is_none());

        let state = LockoutState {
            failed_attempts: 3,
            lockout_until: Some(Utc::now()),
        };
        store.save(&state).unwrap();

        let reopened = FileLockoutStore::new(temp.path().join("lockout.json"));
        assert_eq!(reopened.load().unwrap(), Some(state));
    }

    #[test]
    fn test_file_store_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lockout.json");
        std::fs::write(&path, b"{\"failed_attempts\": \"many\"").unwrap();

        let err = FileLockoutStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryLockoutStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&LockoutState::default()).unwrap();
        assert_eq!(store.load().unwrap(), Some(LockoutState::default()));
    }
}
