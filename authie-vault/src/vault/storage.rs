//! Encrypted and plaintext forms of the stored token collection.
//!
//! This module provides:
//! - `VaultKey`: A 256-bit key wrapper that zeroizes on drop
//! - `Envelope`: the `{iv, data}` record written when a passcode is set
//! - Plaintext encode/decode used when no passcode is configured

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::entropy::EntropySource;
use super::error::{VaultError, VaultResult};
use crate::token::Token;

/// Nonce size for AES-GCM (96 bits = 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// A 256-bit encryption key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; 32],
}

impl VaultKey {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the key as a byte slice for cryptographic operations.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    fn cipher(&self) -> VaultResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| VaultError::Encryption(format!("Invalid key: {}", e)))
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the actual key material
        f.debug_struct("VaultKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// The stored form of an encrypted collection.
///
/// Both fields are standard base64. `data` is the AES-256-GCM output,
/// ciphertext followed by the 16-byte tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub iv: String,
    pub data: String,
}

impl Envelope {
    /// Serialize and encrypt `tokens` under `key` with a fresh random IV.
    pub fn seal(tokens: &[Token], key: &VaultKey, entropy: &dyn EntropySource) -> VaultResult<Self> {
        let plaintext = Zeroizing::new(serde_json::to_vec(tokens)?);

        let mut iv = [0u8; NONCE_SIZE];
        entropy.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let ciphertext = key
            .cipher()?
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| VaultError::Encryption(format!("Encryption failed: {}", e)))?;

        Ok(Self {
            iv: STANDARD.encode(iv),
            data: STANDARD.encode(ciphertext),
        })
    }

    /// Authenticate and decrypt, returning the raw serialized collection.
    ///
    /// A wrong key and a tampered envelope fail the same way.
    pub fn decrypt(&self, key: &VaultKey) -> VaultResult<Zeroizing<Vec<u8>>> {
        let iv = STANDARD
            .decode(&self.iv)
            .map_err(|e| VaultError::Decryption(format!("Invalid IV encoding: {}", e)))?;
        if iv.len() != NONCE_SIZE {
            return Err(VaultError::Decryption(format!(
                "Invalid IV length: expected {} bytes, got {}",
                NONCE_SIZE,
                iv.len()
            )));
        }
        let data = STANDARD
            .decode(&self.data)
            .map_err(|e| VaultError::Decryption(format!("Invalid data encoding: {}", e)))?;

        key.cipher()?
            .decrypt(Nonce::from_slice(&iv), data.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| VaultError::Decryption("Authentication failed".into()))
    }

    /// Decrypt and deserialize the token collection.
    pub fn open(&self, key: &VaultKey) -> VaultResult<Vec<Token>> {
        let plaintext = self.decrypt(key)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::Decryption(format!("Decrypted data is not a token list: {}", e)))
    }

    pub fn from_json(raw: &str) -> VaultResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| VaultError::Parse(format!("Invalid envelope: {}", e)))
    }

    pub fn to_json(&self) -> VaultResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Plaintext form: a JSON array of tokens.
pub fn encode_plain(tokens: &[Token]) -> VaultResult<Zeroizing<String>> {
    Ok(Zeroizing::new(serde_json::to_string(tokens)?))
}

pub fn decode_plain(raw: &str) -> VaultResult<Vec<Token>> {
    serde_json::from_str(raw).map_err(|e| VaultError::Parse(format!("Invalid token list: {}", e)))
}
