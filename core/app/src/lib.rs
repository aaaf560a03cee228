//! Application layer for MediaVault.
//!
//! `MediaVault` is the composition root: it wires one installation's key
//! store, owner gate, key manager, encryption engine, passcode
//! authenticator and lockout guard together as explicitly owned values.
//! Frontends (the CLI, a mobile shell) hold one `MediaVault` and go
//! through it.

pub mod config;

pub use config::{AppConfig, ConfigVersion, CONFIG_FILENAME, KEYSTORE_DIRNAME, LOCKOUT_FILENAME};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use mediavault_auth::{
    AuthOutcome, BiometricAuthenticator, FileLockoutStore, LockoutGuard, LockoutStatus,
    PasscodeAuthenticator, UnlockCoordinator,
};
use mediavault_common::{Clock, Error, KeyId, Result, SystemClock};
use mediavault_crypto::{EncryptedBlob, SecureBuffer};
use mediavault_keystore::{FileKeyStore, GatedKeyStore, KeyStore, OwnerGate};
use mediavault_vault::{EncryptionEngine, KeyManager};

/// Snapshot of an installation for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStatus {
    /// Whether a passcode is configured.
    pub passcode_set: bool,
    /// Whether a master key exists in the key store.
    pub master_key_present: bool,
    /// Whether an owner authentication is currently valid.
    pub unlocked: bool,
    /// Passcode lockout state.
    pub lockout: LockoutStatus,
}

/// One MediaVault installation rooted at a data directory.
pub struct MediaVault {
    data_dir: PathBuf,
    config: AppConfig,
    keystore: Arc<dyn KeyStore>,
    keys: Arc<KeyManager>,
    engine: EncryptionEngine,
    unlock: UnlockCoordinator,
}

impl MediaVault {
    /// Open the installation at `data_dir` using the system clock.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_clock(data_dir, Arc::new(SystemClock))
    }

    /// Open the installation at `data_dir`, creating the directory if
    /// needed.
    ///
    /// # Errors
    /// - Config errors from `AppConfig::load`
    /// - `FileWriteError` if the data directory cannot be created
    /// - `FileReadError` if the lockout state cannot be read
    pub fn open_with_clock(data_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|source| Error::FileWriteError {
            path: data_dir.clone(),
            source,
        })?;

        let config = AppConfig::load(&data_dir)?;

        let keystore: Arc<dyn KeyStore> =
            Arc::new(FileKeyStore::new(data_dir.join(KEYSTORE_DIRNAME))?);
        let gate = Arc::new(OwnerGate::new(config.owner_auth_validity(), clock.clone()));

        // Only the master key sits behind the gate. The passcode record
        // has to be readable before anyone is authenticated.
        let gated: Arc<dyn KeyStore> = Arc::new(GatedKeyStore::new(keystore.clone(), gate.clone()));
        let keys = Arc::new(KeyManager::new(gated, KeyId::new(&config.key_id)?));
        let engine = EncryptionEngine::new(keys.clone());

        let passcodes = Arc::new(PasscodeAuthenticator::new(
            keystore.clone(),
            config.passcode.clone(),
            config.kdf.clone(),
        )?);
        let lockout = Arc::new(LockoutGuard::load(
            config.lockout.clone(),
            Arc::new(FileLockoutStore::new(data_dir.join(LOCKOUT_FILENAME))),
            clock,
        )?);
        let unlock = UnlockCoordinator::new(passcodes, lockout, gate);

        info!(data_dir = %data_dir.display(), "Vault opened");

        Ok(Self {
            data_dir,
            config,
            keystore,
            keys,
            engine,
            unlock,
        })
    }

    /// Get the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get the master key manager.
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Get the encryption engine.
    pub fn engine(&self) -> &EncryptionEngine {
        &self.engine
    }

    /// Get the passcode authenticator.
    pub fn passcodes(&self) -> &Arc<PasscodeAuthenticator> {
        self.unlock.passcodes()
    }

    /// Get the lockout guard.
    pub fn lockout(&self) -> &Arc<LockoutGuard> {
        self.unlock.lockout()
    }

    /// Get the unlock coordinator.
    pub fn coordinator(&self) -> &UnlockCoordinator {
        &self.unlock
    }

    /// Whether an owner authentication is currently valid.
    pub fn is_unlocked(&self) -> bool {
        self.unlock.gate().is_open()
    }

    fn require_unlocked(&self) -> Result<()> {
        if self.is_unlocked() {
            Ok(())
        } else {
            Err(Error::AccessDenied("Unlock the vault first".to_string()))
        }
    }

    /// Current status.
    pub fn status(&self) -> Result<VaultStatus> {
        Ok(VaultStatus {
            passcode_set: self.passcodes().has_passcode()?,
            master_key_present: self.keystore.contains(self.keys.key_id())?,
            unlocked: self.is_unlocked(),
            lockout: self.lockout().status(),
        })
    }

    /// Unlock with a passcode; see `UnlockCoordinator::unlock_with_passcode`.
    pub fn unlock_with_passcode(&self, candidate: &str) -> Result<AuthOutcome> {
        self.unlock.unlock_with_passcode(candidate)
    }

    /// Unlock with biometrics; see `UnlockCoordinator::unlock_with_biometrics`.
    pub fn unlock_with_biometrics(
        &self,
        biometrics: &dyn BiometricAuthenticator,
        reason: &str,
    ) -> Result<AuthOutcome> {
        self.unlock.unlock_with_biometrics(biometrics, reason)
    }

    /// Close the owner gate and drop the cached master key.
    pub fn lock(&self) {
        self.unlock.lock();
        self.keys.invalidate_cache();
        info!("Vault locked");
    }

    /// Configure the passcode.
    ///
    /// Setting the first passcode authenticates the owner. Replacing an
    /// existing one requires an unlocked vault.
    ///
    /// # Errors
    /// - `AccessDenied` if a passcode exists and the vault is locked
    /// - `InvalidInput` if the candidate violates the policy
    pub fn set_passcode(&self, candidate: &str) -> Result<()> {
        if self.passcodes().has_passcode()? {
            self.require_unlocked()?;
        }
        self.passcodes().set_passcode(candidate)?;
        self.unlock.gate().open();
        Ok(())
    }

    /// Replace the passcode, authenticating with the current one.
    ///
    /// The current passcode goes through the unlock flow, so wrong guesses
    /// count towards the lockout.
    ///
    /// # Returns
    /// The outcome of authenticating `current`; the passcode is replaced
    /// only on `Authenticated`.
    pub fn change_passcode(&self, current: &str, new: &str) -> Result<AuthOutcome> {
        self.passcodes().policy().check(new)?;
        let outcome = self.unlock.unlock_with_passcode(current)?;
        if outcome.is_authenticated() {
            self.passcodes().set_passcode(new)?;
        }
        Ok(outcome)
    }

    /// Remove the passcode.
    ///
    /// # Errors
    /// - `AccessDenied` if the vault is locked
    pub fn remove_passcode(&self) -> Result<()> {
        self.require_unlocked()?;
        self.passcodes().remove_passcode()
    }

    /// Delete the master key. Everything encrypted with it becomes
    /// unreadable.
    ///
    /// # Errors
    /// - `AccessDenied` if the vault is locked
    pub fn reset_key(&self) -> Result<()> {
        self.require_unlocked()?;
        self.keys.delete_key()
    }

    /// Encrypt a payload. Requires an unlocked vault.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob> {
        self.require_unlocked()?;
        self.engine.encrypt(plaintext)
    }

    /// Decrypt a blob. Requires an unlocked vault.
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<SecureBuffer> {
        self.require_unlocked()?;
        self.engine.decrypt(blob)
    }

    /// Encrypt a file. Requires an unlocked vault.
    pub fn encrypt_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        self.require_unlocked()?;
        self.engine.encrypt_file(source, destination)
    }

    /// Decrypt a file. Requires an unlocked vault.
    pub fn decrypt_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        self.require_unlocked()?;
        self.engine.decrypt_file(source, destination)
    }
}
