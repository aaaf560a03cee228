//! Explicit wiping of decrypted plaintext.
//!
//! Writes go through `zeroize`, which uses volatile stores followed by a
//! compiler fence, so the optimizer cannot drop them even when the buffer
//! is never read again.

use std::fmt;
use zeroize::Zeroize;

use mediavault_common::{Error, Result};

/// Overwrite every byte of `buffer` with zero.
pub fn wipe(buffer: &mut [u8]) {
    buffer.zeroize();
}

/// Wipe a vector's contents and truncate it.
///
/// Spare capacity is wiped as well, so bytes left behind by an earlier
/// `truncate` do not survive.
pub fn wipe_vec(buffer: &mut Vec<u8>) {
    buffer.zeroize();
}

/// Single-owner wrapper around decrypted plaintext.
///
/// The content is wiped on `wipe`, on `release`, or on drop, whichever
/// happens first. Reads after wiping fail with `Error::BufferReleased`.
/// Deliberately not `Clone`.
pub struct SecureBuffer {
    data: Vec<u8>,
    wiped: bool,
}

impl SecureBuffer {
    /// Take ownership of plaintext bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, wiped: false }
    }

    /// Borrow the plaintext.
    ///
    /// # Errors
    /// - `BufferReleased` once the buffer has been wiped
    pub fn read(&self) -> Result<&[u8]> {
        if self.wiped {
            return Err(Error::BufferReleased);
        }
        Ok(&self.data)
    }

    /// Plaintext length, or 0 after wiping.
    pub fn len(&self) -> usize {
        if self.wiped {
            0
        } else {
            self.data.len()
        }
    }

    /// Check if empty (always true after wiping).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer has been wiped.
    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Zero the plaintext. Idempotent.
    pub fn wipe(&mut self) {
        if self.wiped {
            return;
        }
        wipe_vec(&mut self.data);
        self.wiped = true;
    }

    /// Give up ownership, wiping immediately.
    pub fn release(mut self) {
        self.wipe();
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl From<Vec<u8>> for SecureBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wiped {
            write!(f, "SecureBuffer([WIPED])")
        } else {
            write!(f, "SecureBuffer([REDACTED; {} bytes])", self.data.len())
        }
    }
}
