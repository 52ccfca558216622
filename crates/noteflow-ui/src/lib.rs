//! # noteflow UI bindings
//!
//! Adapters that tie the event bus to the lifetime of view components:
//! stable emit handles, subscriptions that follow mount and unmount, and
//! history and metrics views for diagnostic panels.

pub mod history_view;
pub mod hooks;
pub mod metrics_view;

pub use history_view::{use_event_history, HistoryView, HistoryViewOptions};
pub use hooks::{use_emit, use_event, EmitHandle, EventHook};
pub use metrics_view::{use_event_metrics, MetricsView};
