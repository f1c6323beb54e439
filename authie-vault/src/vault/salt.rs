//! Salt manager for passcode key derivation.
//!
//! A fresh 16-byte salt is generated whenever a passcode is set on a vault
//! that has none, and on every passcode change. It is stored base64-encoded
//! under [`SALT_KEY`]; salts are not secret. Its presence in storage is what
//! marks the vault as passcode-protected.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use super::entropy::EntropySource;
use super::error::{VaultError, VaultResult};
use crate::storage::{KeyValueStore, SALT_KEY};

/// Salt size in bytes (128 bits)
pub const SALT_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generate a new random salt.
    pub fn generate(entropy: &dyn EntropySource) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        entropy.fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> VaultResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::Salt(format!("Invalid base64: {}", e)))?;

        let salt: [u8; SALT_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            VaultError::Salt(format!(
                "Invalid salt size: expected {} bytes, got {}",
                SALT_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(salt))
    }
}

/// Whether a salt is stored, without validating it.
pub async fn has_salt(store: &dyn KeyValueStore) -> VaultResult<bool> {
    Ok(store.get(SALT_KEY).await?.is_some())
}

/// Load the stored salt, `None` when no passcode is configured.
///
/// # Errors
/// Returns `VaultError::Salt` if the stored value does not decode to
/// exactly 16 bytes.
pub async fn load_salt(store: &dyn KeyValueStore) -> VaultResult<Option<Salt>> {
    match store.get(SALT_KEY).await? {
        Some(encoded) => Salt::from_base64(&encoded).map(Some),
        None => Ok(None),
    }
}

pub async fn store_salt(store: &dyn KeyValueStore, salt: &Salt) -> VaultResult<()> {
    store.set(SALT_KEY, &salt.to_base64()).await?;
    debug!("Stored new passcode salt");
    Ok(())
}

/// Delete the salt. Returns `Ok(())` if none was stored.
pub async fn delete_salt(store: &dyn KeyValueStore) -> VaultResult<()> {
    store.remove(SALT_KEY).await?;
    debug!("Deleted passcode salt");
    Ok(())
}
