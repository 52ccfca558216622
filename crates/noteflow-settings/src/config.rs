//! Settings file handling for noteflow
//!
//! Settings are stored as JSON or TOML, chosen by file extension, in the
//! platform config directory by default. The file carries the event bus
//! configuration plus where durable history lives.

use noteflow_core::EventBusConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SettingsError, SettingsResult};

/// Application directory name under the platform config/data dirs
pub const APP_DIR: &str = "noteflow";

/// Default settings file name
pub const SETTINGS_FILE: &str = "settings.toml";

/// Where durable history is kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for history files. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl StorageSettings {
    /// The configured directory, or `<data dir>/noteflow`
    pub fn resolve_directory(&self) -> SettingsResult<PathBuf> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }
}

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Event bus behaviour
    pub event_bus: EventBusConfig,
    /// History storage location
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a `.json` or `.toml` file
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let settings: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        settings.validate()?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Save settings to a `.json` or `.toml` file, creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    ///
    /// A file that exists but cannot be parsed is still an error.
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate the event bus section
    pub fn validate(&self) -> SettingsResult<()> {
        self.event_bus.validate()?;
        Ok(())
    }
}

/// `<config dir>/noteflow/settings.toml`
pub fn default_settings_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
        .ok_or_else(|| SettingsError::Directory("no platform config directory".to_string()))
}

/// `<data dir>/noteflow`
pub fn default_data_dir() -> SettingsResult<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| SettingsError::Directory("no platform data directory".to_string()))
}
