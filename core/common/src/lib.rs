//! Common utilities and types shared across MediaVault modules.
//!
//! This module provides foundational types that are used throughout the codebase,
//! ensuring consistency and type safety.

pub mod clock;
pub mod error;
pub mod fs;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, KeyStoreOperation, Result};
pub use types::{KeyId, SensitiveBytes};
