//! Authie vault: local, passcode-protected storage for OTP account secrets.
//!
//! The [`VaultStore`] owns the in-memory token collection and keeps the
//! durable copy in sync with it. When a passcode is configured the
//! collection is stored as an AES-256-GCM envelope under a key derived
//! from the passcode and a per-vault salt.

pub mod error;
pub mod storage;
pub mod token;
pub mod vault;

pub use error::{AuthieError, Result};
pub use storage::{FileStore, KeyValueStore, MemoryStore, VaultSettings, SALT_KEY, TOKENS_KEY};
pub use token::Token;
pub use vault::{
    EntropySource, KdfSettings, OsEntropy, VaultError, VaultResult, VaultStatus, VaultStore,
};
