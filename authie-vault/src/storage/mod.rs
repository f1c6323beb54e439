//! Durable key-value storage used by the vault.
//!
//! Values are strings; the vault decides what they contain. Two keys are
//! in use, see [`TOKENS_KEY`] and [`SALT_KEY`].

mod config;
mod file;
mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use config::{load_settings, save_settings, VaultSettings, SETTINGS_FILE_NAME};
pub use file::FileStore;
pub use memory::MemoryStore;

#[cfg(test)]
pub(crate) use memory::FailingStore;

/// Holds the token collection, either as a JSON array or as an envelope.
pub const TOKENS_KEY: &str = "tokens";

/// Holds the base64 passcode salt. Present only while a passcode is configured.
pub const SALT_KEY: &str = "passcodeSalt";

/// String-valued key-value storage.
///
/// Writes overwrite the previous value wholesale. Implementations must be
/// safe to share across tasks; the vault never issues overlapping writes to
/// the same key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written or was removed.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
