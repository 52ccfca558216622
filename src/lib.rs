//! # noteflow
//!
//! Typed in-process event bus for the noteflow notes application.
//!
//! ## Architecture
//!
//! noteflow is organized as a workspace with multiple crates:
//!
//! 1. **noteflow-core** - Event catalog, bus, circuit breaker, history, config
//! 2. **noteflow-settings** - Settings files and the file-backed history store
//! 3. **noteflow-ui** - Component lifetime bindings (emit handles, hooks, views)
//! 4. **noteflow** - Host binary that wires the crates together

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub use noteflow_core::{
    event_bus, init_event_bus, reset_event_bus, AppEvent, Environment, Event, EventBus,
    EventBusConfig, EventBusError, EventName, HistoryEntry, HistoryStore, Listener, MemoryStore,
    MetricsSnapshot, Subscription, WildcardListener,
};
pub use noteflow_settings::{FileHistoryStore, Settings, SettingsError, StorageSettings};
pub use noteflow_ui::{
    use_emit, use_event, use_event_history, use_event_metrics, EmitHandle, EventHook,
    HistoryView, HistoryViewOptions, MetricsView,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Output on stderr, so stdout stays machine readable
/// - RUST_LOG environment variable support
/// - JSON lines instead of pretty output when `NOTEFLOW_LOG_FORMAT=json`
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let json = std::env::var("NOTEFLOW_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .pretty(),
            )
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Load settings from `path`, or from the platform default location
///
/// A missing file yields defaults.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => noteflow_settings::default_settings_path()?,
    };
    Settings::load_or_default(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

/// Install the global bus with a file-backed history store
///
/// Call [`EventBus::ready`] on the result once startup subscribers are wired.
pub fn install_event_bus(settings: &Settings) -> anyhow::Result<EventBus> {
    let directory = settings.storage.resolve_directory()?;
    tracing::info!("Event history stored in {}", directory.display());
    let store: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::new(directory));
    let bus = init_event_bus(settings.event_bus.clone(), Some(store))
        .context("Failed to install event bus")?;
    Ok(bus)
}

/// What the host prints on startup
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    /// Crate version
    pub version: &'static str,
    /// Recorded history, oldest first
    pub history: Vec<HistoryEntry>,
    /// Bus counters
    pub metrics: MetricsSnapshot,
}

impl StartupReport {
    /// Capture the current state of `bus`
    pub fn capture(bus: &EventBus) -> Self {
        Self {
            version: VERSION,
            history: bus.history(None),
            metrics: bus.metrics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteflow_core::event_bus::NoteCreated;

    #[test]
    fn test_history_survives_a_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.event_bus.history.limit = 10;
        settings.storage.directory = Some(dir.path().join("data"));
        settings.save_to_file(&config_path).expect("save settings");

        let loaded = load_settings(Some(&config_path)).expect("load settings");
        assert_eq!(loaded, settings);

        reset_event_bus();
        let bus = install_event_bus(&loaded).expect("install");
        bus.ready();
        bus.emit(NoteCreated {
            note_id: "n1".to_string(),
            folder_id: None,
            title: "Hello".to_string(),
            timestamp: 1000,
        });
        assert!(install_event_bus(&loaded).is_err());

        reset_event_bus();
        let restarted = install_event_bus(&loaded).expect("reinstall");
        let before_ready = StartupReport::capture(&restarted);
        assert_eq!(before_ready.history.len(), 2);

        restarted.ready();
        let report = StartupReport::capture(&restarted);
        let names: Vec<EventName> = report.history.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                EventName::SystemInitialized,
                EventName::NoteCreated,
                EventName::SystemInitialized
            ]
        );

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["history"][1]["event"], "note:created");
        assert_eq!(json["history"][1]["data"]["noteId"], "n1");
        assert_eq!(json["metrics"]["totalEvents"], 1);

        reset_event_bus();
        assert!(dir.path().join("data").join("noteflow_event_history.json").exists());
    }

    #[test]
    fn test_missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(Some(&dir.path().join("absent.toml"))).expect("defaults");
        assert_eq!(settings, Settings::default());
    }
}
