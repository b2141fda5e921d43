use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use ron::ser::PrettyConfig;
use thiserror::Error;

pub const SETTINGS_PATH: &str = "settings.ron";

/// Keys written by the device at runtime
pub mod keys {
    pub const DEVICE_ID: &str = "device_id";
    pub const DEVICE_LABEL: &str = "device_label";
    pub const SACN_ENABLED: &str = "sacn_enabled";
    pub const SACN_UNIVERSE: &str = "sacn_universe";
    pub const SACN_START_ADDRESS: &str = "sacn_start_address";
    pub const BRIGHTNESS: &str = "brightness";
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid RON: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("could not serialize settings: {0}")]
    Serialize(#[from] ron::Error),
}

/// Persistent key/value store for values that outlive a restart
pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError>;

    /// Forget everything. Used by the factory reset.
    fn clear(&mut self) -> Result<(), SettingsError>;
}

/// Settings kept in a RON map on disk
#[derive(Debug)]
pub struct RonSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl RonSettings {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            ron::from_str(&text)?
        } else {
            BTreeMap::new()
        };
        info!("Loaded {} stored settings from {}", values.len(), path.display());
        Ok(Self { path, values })
    }

    fn persist(&self) -> Result<(), SettingsError> {
        let text = ron::ser::to_string_pretty(&self.values, PrettyConfig::default())?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl SettingsStore for RonSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), value.to_string());
        self.persist()
    }

    fn clear(&mut self) -> Result<(), SettingsError> {
        self.values.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Could not remove {}: {}", self.path.display(), e);
                Err(e.into())
            }
        }
    }
}

/// Settings that vanish with the process
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: BTreeMap<String, String>,
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SettingsError> {
        self.values.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;

    #[test]
    fn test_values_survive_reopen() {
        let path = scratch_dir("settings-reopen").join("settings.ron");
        let mut settings = RonSettings::open(&path).unwrap();
        settings.set(keys::SACN_UNIVERSE, "7").unwrap();
        settings.set(keys::DEVICE_LABEL, "Porch skull").unwrap();

        let settings = RonSettings::open(&path).unwrap();
        assert_eq!(settings.get(keys::SACN_UNIVERSE).as_deref(), Some("7"));
        assert_eq!(
            settings.get(keys::DEVICE_LABEL).as_deref(),
            Some("Porch skull")
        );
    }

    #[test]
    fn test_clear_removes_file() {
        let path = scratch_dir("settings-clear").join("settings.ron");
        let mut settings = RonSettings::open(&path).unwrap();
        settings.set(keys::BRIGHTNESS, "40").unwrap();
        assert!(path.exists());

        settings.clear().unwrap();
        assert!(!path.exists());
        assert_eq!(settings.get(keys::BRIGHTNESS), None);
        // Clearing twice is fine
        settings.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let path = scratch_dir("settings-corrupt").join("settings.ron");
        std::fs::write(&path, "{ not ron").unwrap();
        assert!(matches!(
            RonSettings::open(&path),
            Err(SettingsError::Parse(_))
        ));
    }
}
