//! Passcode-protected token vault.
//!
//! This module provides:
//! - Key derivation from the user's passcode and a per-vault salt
//! - AES-256-GCM envelopes for the stored token collection
//! - The [`VaultStore`] that keeps memory and storage in sync
//!
//! A salt in storage is the durable signal that a passcode is configured.
//! The derived key only ever lives in memory.

pub mod auth;
pub mod entropy;
pub mod error;
pub mod kdf;
pub mod manager;
pub mod salt;
pub mod storage;

pub use auth::VaultStatus;
pub use entropy::{EntropySource, OsEntropy};
pub use error::{VaultError, VaultResult};
pub use kdf::KdfSettings;
pub use manager::VaultStore;
pub use salt::Salt;
pub use storage::{Envelope, VaultKey};
