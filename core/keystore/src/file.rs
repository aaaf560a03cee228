//! Local filesystem key store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::store::KeyStore;
use mediavault_common::{fs, Error, KeyId, KeyStoreOperation, Result, SensitiveBytes};

/// Directory-backed key store.
///
/// Each entry is one file whose name is the hex-encoded identifier, so any
/// identifier maps to a safe file name. Writes are atomic and, on Unix,
/// owner-readable only. This backend is for hosts without a platform vault;
/// it relies on filesystem permissions for access control.
pub struct FileKeyStore {
    root: PathBuf,
}

impl FileKeyStore {
    /// Create a new file store rooted at `root`.
    ///
    /// # Postconditions
    /// - Root directory exists (created with mode 0700 on Unix if missing)
    ///
    /// # Errors
    /// - `FileWriteError` if the directory cannot be created
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            create_private_dir(&root).map_err(|source| Error::FileWriteError {
                path: root.clone(),
                source,
            })?;
        }

        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, id: &KeyId) -> PathBuf {
        self.root
            .join(format!("{}.key", hex::encode(id.as_str().as_bytes())))
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

impl KeyStore for FileKeyStore {
    fn name(&self) -> &str {
        "file"
    }

    fn save(&self, id: &KeyId, secret: &[u8]) -> Result<()> {
        debug!(key_id = %id, "Saving key store entry");
        fs::atomic_write(&self.entry_path(id), secret)
            .map_err(|e| Error::key_store(KeyStoreOperation::Save, e))
    }

    fn retrieve(&self, id: &KeyId) -> Result<Option<SensitiveBytes>> {
        let data = fs::read_optional(&self.entry_path(id))
            .map_err(|e| Error::key_store(KeyStoreOperation::Retrieve, e))?;
        Ok(data.map(SensitiveBytes::new))
    }

    fn delete(&self, id: &KeyId) -> Result<()> {
        debug!(key_id = %id, "Deleting key store entry");
        fs::remove_if_exists(&self.entry_path(id))
            .map_err(|e| Error::key_store(KeyStoreOperation::Delete, e))
    }

    fn contains(&self, id: &KeyId) -> Result<bool> {
        match std::fs::metadata(self.entry_path(id)) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::key_store(KeyStoreOperation::Retrieve, e)),
        }
    }
}
