//! One OTP account entry as shown in the token list.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An OTP account: what the user sees plus the seed used to generate codes.
///
/// The field names are the on-disk JSON names, so plaintext vaults written
/// by other Authie clients deserialize as-is. No uniqueness is enforced;
/// position in the collection is the display order.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Token {
    pub name: String,
    pub username: String,
    /// UI color tag, e.g. `#fff`.
    pub color: String,
    /// The OTP seed. Opaque to the vault.
    pub secret: String,
}

impl Token {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        color: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            color: color.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the OTP seed
        f.debug_struct("Token")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("color", &self.color)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
