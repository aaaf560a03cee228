//! Filesystem helpers with all-or-nothing writes.

use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Write `data` to `path` atomically.
///
/// # Postconditions
/// - Readers observe either the previous content or the complete new
///   content, never a partial file
/// - On Unix the file is created with owner-only permissions
///
/// # Errors
/// - `FileWriteError` if the parent directory is missing or the write,
///   flush or rename fails; the temporary file is removed in that case
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let write_err = |source| Error::FileWriteError {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    // Temp file lives in the destination directory so the rename stays on
    // one filesystem.
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(data).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}

/// Read a whole file.
///
/// # Errors
/// - `FileReadError` on any I/O failure, including a missing file
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::FileReadError {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a whole file, treating a missing file as `None`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::FileReadError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Remove a file, treating a missing file as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(Error::FileWriteError {
            path: path.to_path_buf(),
            source,
        }),
    }
}
