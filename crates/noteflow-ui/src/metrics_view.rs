//! Bus metrics for diagnostic panels.

use noteflow_core::event_bus::{EventBus, MetricsSnapshot};
use parking_lot::RwLock;

/// Last metrics snapshot taken from a bus
pub struct MetricsView {
    bus: EventBus,
    snapshot: RwLock<MetricsSnapshot>,
}

impl MetricsView {
    /// The last snapshot taken
    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.snapshot.read()
    }

    /// Take a fresh snapshot and return it
    pub fn refresh(&self) -> MetricsSnapshot {
        let snapshot = self.bus.metrics();
        *self.snapshot.write() = snapshot;
        snapshot
    }
}

impl std::fmt::Debug for MetricsView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsView")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Build a metrics view over `bus`
pub fn use_event_metrics(bus: &EventBus) -> MetricsView {
    MetricsView {
        bus: bus.clone(),
        snapshot: RwLock::new(bus.metrics()),
    }
}
