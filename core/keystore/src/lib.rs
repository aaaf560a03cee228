//! Secure key store backends for MediaVault.
//!
//! The core never talks to a platform secret vault directly; it goes
//! through the narrow `KeyStore` trait so it can be tested with the
//! in-memory fake and ported to other backends.

pub mod file;
pub mod gate;
pub mod memory;
pub mod store;

pub use file::FileKeyStore;
pub use gate::{GatedKeyStore, OwnerGate};
pub use memory::MemoryKeyStore;
pub use store::KeyStore;
