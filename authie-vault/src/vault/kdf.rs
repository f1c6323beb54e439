//! Passcode key derivation.
//!
//! Turns the user's passcode and the vault salt into a 256-bit AES key.
//! Derivation is deliberately slow, so the async entry point moves it onto
//! tokio's blocking pool.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use super::error::{VaultError, VaultResult};
use super::salt::Salt;
use super::storage::VaultKey;

/// Output length: 256-bit key for AES-256.
pub const KEY_LEN: usize = 32;

/// Argon2id parameters used by default.
/// - Memory: 64 MB (provides strong resistance to GPU attacks)
/// - Time: 3 iterations
/// - Parallelism: 4 lanes
const ARGON2_MEMORY_COST: u32 = 65536; // 64 MB in KiB
const ARGON2_TIME_COST: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// Lower bound for PBKDF2; also the count used by the web client.
pub const PBKDF2_MIN_ITERATIONS: u32 = 100_000;

/// Which KDF to run and with what cost.
///
/// Serialized with an `algorithm` tag, e.g.
/// `{"algorithm":"pbkdf2_sha256","iterations":100000}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum KdfSettings {
    Argon2id {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
    Pbkdf2Sha256 {
        iterations: u32,
    },
}

impl Default for KdfSettings {
    fn default() -> Self {
        KdfSettings::Argon2id {
            memory_kib: ARGON2_MEMORY_COST,
            iterations: ARGON2_TIME_COST,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

impl KdfSettings {
    /// PBKDF2-HMAC-SHA256 at 100,000 iterations, matching vaults written by
    /// the browser client.
    pub fn web_compatible() -> Self {
        KdfSettings::Pbkdf2Sha256 {
            iterations: PBKDF2_MIN_ITERATIONS,
        }
    }

    /// Reject parameters the KDF would refuse or that are too weak.
    pub fn validate(&self) -> VaultResult<()> {
        match *self {
            KdfSettings::Argon2id { .. } => self.argon2_params().map(|_| ()),
            KdfSettings::Pbkdf2Sha256 { iterations } if iterations < PBKDF2_MIN_ITERATIONS => {
                Err(VaultError::KeyDerivation(format!(
                    "PBKDF2 needs at least {} iterations, got {}",
                    PBKDF2_MIN_ITERATIONS, iterations
                )))
            }
            KdfSettings::Pbkdf2Sha256 { .. } => Ok(()),
        }
    }

    fn argon2_params(&self) -> VaultResult<Params> {
        let KdfSettings::Argon2id {
            memory_kib,
            iterations,
            parallelism,
        } = *self
        else {
            return Err(VaultError::KeyDerivation("Not an Argon2 configuration".into()));
        };

        Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
            .map_err(|e| VaultError::KeyDerivation(format!("Invalid Argon2 params: {}", e)))
    }
}

/// Derive the vault key from a passcode and salt.
///
/// Deterministic: the same passcode, salt and settings always give the
/// same key. Blocks for as long as the KDF cost dictates.
pub fn derive_key(passcode: &str, salt: &Salt, settings: &KdfSettings) -> VaultResult<VaultKey> {
    settings.validate()?;

    let mut key_bytes = Zeroizing::new([0u8; KEY_LEN]);
    match *settings {
        KdfSettings::Argon2id { .. } => {
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, settings.argon2_params()?);
            argon2
                .hash_password_into(passcode.as_bytes(), salt.as_bytes(), &mut key_bytes[..])
                .map_err(|e| VaultError::KeyDerivation(format!("Argon2 failed: {}", e)))?;
        }
        KdfSettings::Pbkdf2Sha256 { iterations } => {
            pbkdf2::pbkdf2_hmac::<Sha256>(
                passcode.as_bytes(),
                salt.as_bytes(),
                iterations,
                &mut key_bytes[..],
            );
        }
    }

    debug!("Derived {}-byte key from passcode", KEY_LEN);
    Ok(VaultKey::from_bytes(*key_bytes))
}

/// [`derive_key`] on the blocking pool so it never stalls the executor.
pub async fn derive_key_async(
    passcode: &str,
    salt: &Salt,
    settings: &KdfSettings,
) -> VaultResult<VaultKey> {
    let passcode = Zeroizing::new(passcode.to_string());
    let salt = salt.clone();
    let settings = *settings;

    tokio::task::spawn_blocking(move || derive_key(&passcode, &salt, &settings))
        .await
        .map_err(|e| VaultError::KeyDerivation(format!("Derivation task failed: {}", e)))?
}

#[cfg(test)]
pub(crate) fn fast_settings() -> KdfSettings {
    KdfSettings::Argon2id {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}
