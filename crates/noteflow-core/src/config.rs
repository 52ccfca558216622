//! Event bus configuration.
//!
//! Every field has a default so partial settings files deserialize cleanly.
//! Durations are stored in milliseconds to keep the file format flat.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::event_bus::circuit::{CircuitBreakerConfig, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT};

/// Default store key for the persisted history snapshot.
pub const DEFAULT_STORAGE_KEY: &str = "noteflow_event_history";

/// Runtime context the bus is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// An interactive host; the bus is fully active.
    #[default]
    Interactive,
    /// A non-interactive context (batch jobs, server-side rendering).
    /// `emit` and `on` become silent no-ops.
    Headless,
}

/// History recording settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Record emitted events.
    pub enabled: bool,
    /// Maximum entries kept.
    pub limit: usize,
    /// Persist to the durable store when one is supplied.
    pub persist: bool,
    /// Key of the persisted snapshot.
    pub storage_key: String,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 100,
            persist: true,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before a listener is removed.
    pub max_failures: u32,
    /// Milliseconds after the last failure before a breaker may close.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout_ms: DEFAULT_RESET_TIMEOUT.as_millis() as u64,
        }
    }
}

impl From<CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: CircuitBreakerSettings) -> Self {
        Self {
            max_failures: settings.max_failures,
            reset_timeout: Duration::from_millis(settings.reset_timeout_ms),
        }
    }
}

/// Dispatch timing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Dispatches longer than this many milliseconds count as slow.
    pub slow_threshold_ms: u64,
    /// Measure dispatch duration at all.
    pub track_emit_time: bool,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 16,
            track_emit_time: true,
        }
    }
}

impl PerformanceSettings {
    /// Slow threshold as a duration
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

/// Listener hygiene settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Warn when one event has more listeners than this.
    pub max_listeners_per_event: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_listeners_per_event: 50,
        }
    }
}

/// Diagnostic verbosity. Never affects delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    /// Master switch for the options below.
    pub enabled: bool,
    /// Log every emission at debug level.
    pub log_emissions: bool,
    /// Log every subscribe/unsubscribe at debug level.
    pub log_subscriptions: bool,
}

impl DebugSettings {
    pub(crate) fn emissions(&self) -> bool {
        self.enabled && self.log_emissions
    }

    pub(crate) fn subscriptions(&self) -> bool {
        self.enabled && self.log_subscriptions
    }
}

/// Configuration for the event bus
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Runtime context guard.
    pub environment: Environment,
    /// History recording and persistence.
    pub history: HistorySettings,
    /// Per-listener failure isolation.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Dispatch timing.
    pub performance: PerformanceSettings,
    /// Listener-count hygiene.
    pub memory: MemorySettings,
    /// Diagnostic logging.
    pub debug: DebugSettings,
}

impl EventBusConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for a non-interactive context
    pub fn headless() -> Self {
        Self {
            environment: Environment::Headless,
            ..Self::default()
        }
    }

    /// Whether the bus is active in this context
    pub fn is_interactive(&self) -> bool {
        self.environment == Environment::Interactive
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.enabled && self.history.limit == 0 {
            return Err(ConfigError::invalid(
                "history.limit",
                "must be > 0 when history is enabled",
            ));
        }

        if self.history.persist && self.history.storage_key.trim().is_empty() {
            return Err(ConfigError::invalid(
                "history.storage_key",
                "must not be empty when persistence is enabled",
            ));
        }

        if self.circuit_breaker.max_failures == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.max_failures",
                "must be > 0",
            ));
        }

        if self.memory.max_listeners_per_event == 0 {
            return Err(ConfigError::invalid(
                "memory.max_listeners_per_event",
                "must be > 0",
            ));
        }

        Ok(())
    }
}
