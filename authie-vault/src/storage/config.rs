use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AuthieError, Result};
use crate::vault::KdfSettings;

/// File name of the settings document inside the data directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Vault configuration. Not sensitive, stored next to the vault data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Key derivation used for the passcode. Changing this on a configured
    /// vault makes the existing ciphertext unreadable until it is re-keyed.
    #[serde(default)]
    pub kdf: KdfSettings,
}

impl VaultSettings {
    pub fn validate(&self) -> Result<()> {
        self.kdf
            .validate()
            .map_err(|e| AuthieError::Config(e.to_string()))
    }
}

/// Load settings from `data_dir`, falling back to defaults when missing.
pub fn load_settings(data_dir: &Path) -> Result<VaultSettings> {
    let path = data_dir.join(SETTINGS_FILE_NAME);

    if !path.exists() {
        return Ok(VaultSettings::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: VaultSettings = serde_json::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(data_dir: &Path, settings: &VaultSettings) -> Result<()> {
    settings.validate()?;
    let path = data_dir.join(SETTINGS_FILE_NAME);
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, content)?;
    Ok(())
}
