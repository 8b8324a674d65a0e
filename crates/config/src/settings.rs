// Application settings
// Loaded from ~/.config/xlst/settings.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Defaults applied to every render
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Force word-wrap on every output cell
    pub wrap_text_in_all_cells: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Replace an existing report file instead of refusing
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub render: RenderSettings,
    pub output: OutputSettings,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xlst");
        config_dir.join("settings.toml")
    }

    /// Load settings from the default location, falling back to defaults
    /// when the file does not exist
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load settings from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml(&contents).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(input: &str) -> Result<Self, String> {
        toml::from_str(input).map_err(|e| e.to_string())
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn partial_sections() {
        let s = Settings::from_toml("[output]\noverwrite = true\n").unwrap();
        assert!(s.output.overwrite);
        assert!(!s.render.wrap_text_in_all_cells);

        let s = Settings::from_toml("[render]\nwrap_text_in_all_cells = true\n").unwrap();
        assert!(s.render.wrap_text_in_all_cells);
        assert!(!s.output.overwrite);
    }

    #[test]
    fn rejects_bad_types() {
        let err = Settings::from_toml("[output]\noverwrite = \"yes\"\n").unwrap_err();
        assert!(err.contains("overwrite"));
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[render\n").unwrap();

        match Settings::load_from(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            Settings::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn load_from_reads_both_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[render]\nwrap_text_in_all_cells = true\n\n[output]\noverwrite = true\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(settings.render.wrap_text_in_all_cells);
        assert!(settings.output.overwrite);
    }

    #[test]
    fn config_path_ends_with_app_dir() {
        let path = Settings::config_path();
        assert!(path.ends_with("xlst/settings.toml"));
    }
}
