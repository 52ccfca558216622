//! Process-wide dispatch counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters owned by one bus.
#[derive(Debug, Default)]
pub struct Metrics {
    total_events: AtomicU64,
    total_errors: AtomicU64,
    slow_events: AtomicU64,
}

impl Metrics {
    pub(crate) fn event(&self) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn slow(&self) {
        self.slow_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        active_listeners: usize,
        wildcard_listeners: usize,
        history_size: usize,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            total_events: self.total_events.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            slow_events: self.slow_events.load(Ordering::Relaxed),
            active_listeners,
            wildcard_listeners,
            history_size,
        }
    }
}

/// Point-in-time copy of the bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Events emitted since the bus was constructed.
    pub total_events: u64,
    /// Listener failures, synchronous and deferred.
    pub total_errors: u64,
    /// Dispatches that exceeded the slow threshold.
    pub slow_events: u64,
    /// Per-event listeners, summed over all events.
    pub active_listeners: usize,
    /// Wildcard listeners.
    pub wildcard_listeners: usize,
    /// Entries currently in the history buffer.
    pub history_size: usize,
}
