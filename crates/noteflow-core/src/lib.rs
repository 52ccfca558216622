//! # Noteflow Core
//!
//! Core types and services for noteflow.
//! Provides the typed event registry, the in-process event bus with
//! per-listener circuit breakers, the bounded event history and the
//! configuration and storage abstractions around them.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod store;

pub use config::{Environment, EventBusConfig};
pub use error::{ConfigError, EventBusError, PersistenceError, Result};
pub use store::{HistoryStore, MemoryStore};

// Re-export event bus for convenience
pub use event_bus::{
    event_bus, init_event_bus, reset_event_bus, AppEvent, Event, EventBus, EventName,
    HistoryEntry, Listener, ListenerError, ListenerResult, MetricsSnapshot, Subscription,
    WildcardListener,
};
