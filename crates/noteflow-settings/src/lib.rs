//! noteflow Settings Crate
//!
//! Handles settings files and the file-backed event history store.

pub mod config;
pub mod error;
pub mod persistence;

pub use config::{default_data_dir, default_settings_path, Settings, StorageSettings};
pub use error::{SettingsError, SettingsResult};
pub use persistence::FileHistoryStore;
