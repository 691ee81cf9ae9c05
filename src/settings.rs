use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::SettingsError;

/// Process-wide options, stored as RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub name: String,
    /// Default for forks that do not choose for themselves.
    pub remove_duplicates: bool,
    /// Drop or clamp out-of-range data on everything the engine emits.
    pub sanitize: bool,
    pub initial_scene: Option<u32>,
    pub initial_subscene: Option<usize>,
    /// `tracing-subscriber` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: "patchwork".to_string(),
            remove_duplicates: true,
            sanitize: true,
            initial_scene: None,
            initial_subscene: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let ron_string = fs::read_to_string(path)?;
        let settings: Settings = ron::from_str(&ron_string)?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("settings.ron");
        let settings = Settings {
            remove_duplicates: false,
            initial_scene: Some(2),
            ..Settings::default()
        };

        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = ron::from_str("(sanitize: false)").unwrap();
        assert!(!settings.sanitize);
        assert!(settings.remove_duplicates);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ron");
        std::fs::write(&path, "(sanitize: maybe)").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Parse(_))
        ));
    }
}
