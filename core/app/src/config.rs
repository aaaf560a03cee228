//! Application configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use mediavault_auth::{LockoutPolicy, PasscodePolicy};
use mediavault_common::{fs, Error, KeyId, Result};
use mediavault_crypto::KdfParams;
use mediavault_vault::DEFAULT_MASTER_KEY_ID;

/// Configuration file name in the data directory.
pub const CONFIG_FILENAME: &str = "mediavault.json";

/// Key store directory name in the data directory.
pub const KEYSTORE_DIRNAME: &str = "keys";

/// Lockout state file name in the data directory.
pub const LOCKOUT_FILENAME: &str = "lockout.json";

/// Longest owner-authentication window a config may request.
const MAX_OWNER_AUTH_VALIDITY_SECS: u64 = 24 * 60 * 60;

/// Config format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVersion {
    pub major: u32,
    pub minor: u32,
}

impl ConfigVersion {
    /// Current config format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for ConfigVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Settings for one MediaVault installation.
///
/// Fields missing from the file take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Config format version.
    pub version: ConfigVersion,
    /// Key store identifier of the master key.
    pub key_id: String,
    /// Argon2id parameters for new passcode records.
    pub kdf: KdfParams,
    /// Passcode length rules.
    pub passcode: PasscodePolicy,
    /// Failed-attempt limits.
    pub lockout: LockoutPolicy,
    /// Seconds an owner authentication keeps the key store open.
    pub owner_auth_validity_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: ConfigVersion::CURRENT,
            key_id: DEFAULT_MASTER_KEY_ID.to_string(),
            kdf: KdfParams::default(),
            passcode: PasscodePolicy::default(),
            lockout: LockoutPolicy::default(),
            owner_auth_validity_secs: 300,
        }
    }
}

impl AppConfig {
    /// Path of the config file inside `data_dir`.
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILENAME)
    }

    /// Load the config from `data_dir`, falling back to defaults when no
    /// file exists.
    ///
    /// # Errors
    /// - `Serialization` if the file is not valid JSON
    /// - `InvalidInput` if the version is incompatible or a value is invalid
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::path(data_dir);
        match fs::read_optional(&path)? {
            Some(bytes) => {
                debug!(path = %path.display(), "Loading config");
                Self::from_bytes(&bytes)
            }
            None => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the config to `data_dir`, replacing any existing file.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        self.validate()?;
        fs::atomic_write(&Self::path(data_dir), self.to_json()?.as_bytes())
    }

    /// Check every value.
    pub fn validate(&self) -> Result<()> {
        if !self.version.is_compatible() {
            return Err(Error::InvalidInput(format!(
                "Unsupported config version {}.{}",
                self.version.major, self.version.minor
            )));
        }
        KeyId::new(&self.key_id)?;
        self.kdf.validate()?;
        self.passcode.validate()?;
        self.lockout.validate()?;
        if self.owner_auth_validity_secs == 0
            || self.owner_auth_validity_secs > MAX_OWNER_AUTH_VALIDITY_SECS
        {
            return Err(Error::InvalidInput(format!(
                "owner_auth_validity_secs must be between 1 and {}",
                MAX_OWNER_AUTH_VALIDITY_SECS
            )));
        }
        Ok(())
    }

    /// How long an owner authentication keeps the key store open.
    pub fn owner_auth_validity(&self) -> Duration {
        Duration::seconds(
            self.owner_auth_validity_secs
                .min(MAX_OWNER_AUTH_VALIDITY_SECS) as i64,
        )
    }

    /// Serialize configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize and validate configuration.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let config: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
