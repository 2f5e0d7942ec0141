//! JSON settings document with modification-time based reload

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use directories::ProjectDirs;
use tracing::{debug, warn};

use crate::{
    config::Settings,
    core::error::{ConfigError, ConfigResult},
};

pub const APP_NAME: &str = "portal-autologin";
const CONFIG_FILE: &str = "config.json";

/// File-backed settings store
///
/// The agent only reads through this type; the file itself may be edited
/// by the user or another tool at any time.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store located in the per-user configuration directory
    pub fn default_location() -> ConfigResult<Self> {
        let dirs = ProjectDirs::from("", "", APP_NAME).ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(dirs.config_dir().join(CONFIG_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults when the file is missing or invalid
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", self.path.display());
                Settings::default()
            }
            Err(e) => {
                warn!("Failed to load config {}: {}", self.path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn try_load(&self) -> ConfigResult<Settings> {
        let text = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, settings: &Settings) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// Modification marker of the settings file, `None` if it does not exist
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));

        assert_eq!(store.load(), Settings::default());
        assert!(store.modified().is_none());
    }

    #[test]
    fn test_load_invalid_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::new(path);
        assert!(store.try_load().is_err());
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.json"));

        let settings = Settings {
            ssid: "MDI-New".into(),
            username: "student".into(),
            ..Settings::default()
        };
        store.save(&settings).unwrap();

        assert_eq!(store.load(), settings);
        assert!(store.modified().is_some());
    }
}
