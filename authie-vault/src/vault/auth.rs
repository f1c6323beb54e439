//! Vault lock state as seen by navigation guards.

use serde::{Deserialize, Serialize};

/// Represents the current state of the vault.
///
/// Derived from two facts: whether a salt is stored (a passcode is
/// configured) and whether this session holds a key.
/// - `Unconfigured` → `Unlocked` (a passcode is set)
/// - `Unlocked` → `Unconfigured` (the passcode is cleared)
/// - `Locked` → `Unlocked` (the passcode is entered)
/// - `Unlocked` → `Locked` (the session key is dropped)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VaultStatus {
    /// No passcode; tokens are stored as plain JSON.
    #[default]
    Unconfigured,
    /// A passcode is configured but not entered this session.
    Locked,
    /// A passcode is configured and its key is held in memory.
    Unlocked,
}

impl VaultStatus {
    pub fn from_flags(salt_present: bool, key_present: bool) -> Self {
        match (salt_present, key_present) {
            (false, _) => Self::Unconfigured,
            (true, false) => Self::Locked,
            (true, true) => Self::Unlocked,
        }
    }

    /// Whether tokens can be read and written in this state.
    pub fn is_accessible(&self) -> bool {
        !matches!(self, Self::Locked)
    }
}

impl std::fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "Unconfigured"),
            Self::Locked => write!(f, "Locked"),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}
