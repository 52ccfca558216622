//! # Event Bus Module
//!
//! Provides a typed publish/subscribe bus for decoupled communication between
//! the note, folder, photo, link, label and file modules and the tooling that
//! observes them.
//!
//! ## Overview
//!
//! - Publishers emit typed payloads without knowing subscribers
//! - Subscribers register a [`Listener`] for one event, or a
//!   [`WildcardListener`] for all of them
//! - A failing listener never affects the emitter or other listeners; one
//!   that keeps failing is removed by its circuit breaker
//! - Recent emissions are kept in a bounded, optionally persisted history
//!
//! ## Usage
//!
//! ```rust,ignore
//! use noteflow_core::event_bus::{event_bus, Listener, NoteCreated};
//!
//! let listener = Listener::<NoteCreated>::new(|note| {
//!     println!("created {}", note.note_id);
//!     Ok(())
//! });
//! let subscription = event_bus().on(&listener);
//!
//! event_bus().emit(NoteCreated {
//!     note_id: "n1".to_string(),
//!     folder_id: None,
//!     title: "Hello".to_string(),
//!     timestamp: 1000,
//! });
//!
//! subscription.unsubscribe();
//! ```

mod bus;
pub mod circuit;
mod events;
pub mod history;
mod listener;
mod metrics;

pub use bus::*;
pub use circuit::{BreakerState, CircuitBreakerConfig, CircuitState};
pub use events::*;
pub use history::{EventHistory, HistoryEntry};
pub use listener::{
    DeferredResult, Invocation, Listener, ListenerError, ListenerId, ListenerResult,
    WildcardListener,
};
pub use metrics::MetricsSnapshot;
