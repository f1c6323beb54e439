//! Vault-specific error types.
//!
//! Only some of these ever reach a caller. Parse failures met while
//! loading the vault are logged and degrade to an empty collection, a
//! decrypt failure leaves the vault locked, and a wrong passcode during
//! verification is a plain `false`.

use thiserror::Error;

use crate::error::AuthieError;

/// Errors that can occur during vault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The provided passcode does not open the stored data.
    #[error("Invalid passcode")]
    InvalidPasscode,

    /// A passcode is configured but no key is held for this session.
    #[error("Vault is locked")]
    Locked,

    /// Wrong key, tampered ciphertext or a malformed envelope.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// An error occurred while encrypting the collection.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The stored data could not be parsed.
    #[error("Failed to parse vault data: {0}")]
    Parse(String),

    /// The underlying storage rejected a read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored salt is missing or invalid.
    #[error("Salt error: {0}")]
    Salt(String),

    /// Invalid KDF parameters or a failed derivation.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// No token at the given position.
    #[error("No token at index {0}")]
    TokenNotFound(usize),
}

/// Result type alias for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

// ============================================================================
// Conversions to and from the crate error type
// ============================================================================

impl From<VaultError> for AuthieError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidPasscode => AuthieError::InvalidPasscode,
            VaultError::Locked => AuthieError::Locked,
            VaultError::Decryption(msg) => {
                AuthieError::Encryption(format!("Vault decryption: {}", msg))
            }
            VaultError::Encryption(msg) => {
                AuthieError::Encryption(format!("Vault encryption: {}", msg))
            }
            VaultError::Parse(msg) => {
                AuthieError::Storage(format!("Vault data unreadable: {}", msg))
            }
            VaultError::Storage(msg) => AuthieError::Storage(msg),
            VaultError::Io(e) => AuthieError::Io(e),
            VaultError::Serialization(e) => AuthieError::Serialization(e),
            VaultError::Salt(msg) => AuthieError::Storage(format!("Salt error: {}", msg)),
            VaultError::KeyDerivation(msg) => {
                AuthieError::Encryption(format!("Key derivation: {}", msg))
            }
            VaultError::TokenNotFound(index) => {
                AuthieError::Storage(format!("No token at index {}", index))
            }
        }
    }
}

impl From<AuthieError> for VaultError {
    fn from(err: AuthieError) -> Self {
        match err {
            AuthieError::Io(e) => VaultError::Io(e),
            AuthieError::Serialization(e) => VaultError::Serialization(e),
            AuthieError::InvalidPasscode => VaultError::InvalidPasscode,
            AuthieError::Locked => VaultError::Locked,
            AuthieError::Encryption(msg) => VaultError::Encryption(msg),
            AuthieError::Storage(msg) | AuthieError::Config(msg) => VaultError::Storage(msg),
        }
    }
}

impl VaultError {
    /// Stable code for programmatic handling by front ends.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::InvalidPasscode => "INVALID_PASSCODE",
            VaultError::Locked => "LOCKED",
            VaultError::Decryption(_) => "DECRYPTION_ERROR",
            VaultError::Encryption(_) => "ENCRYPTION_ERROR",
            VaultError::Parse(_) => "PARSE_ERROR",
            VaultError::Storage(_) => "STORAGE_ERROR",
            VaultError::Io(_) => "IO_ERROR",
            VaultError::Serialization(_) => "SERIALIZATION_ERROR",
            VaultError::Salt(_) => "SALT_ERROR",
            VaultError::KeyDerivation(_) => "KEY_DERIVATION_ERROR",
            VaultError::TokenNotFound(_) => "TOKEN_NOT_FOUND",
        }
    }
}

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
