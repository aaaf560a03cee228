//! Vault engine for MediaVault.
//!
//! This module provides:
//! - Master key lifecycle (load, generate-and-persist, cache, delete)
//! - Authenticated encryption of payloads and files with that key
//!
//! # Architecture
//! The vault module sits between the storage layer and the key store.
//! Storage owns paths and naming; the vault only transforms bytes.

pub mod engine;
pub mod key_manager;

pub use engine::EncryptionEngine;
pub use key_manager::{KeyManager, DEFAULT_MASTER_KEY_ID};
