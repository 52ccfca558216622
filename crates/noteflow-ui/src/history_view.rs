//! Filtered, limited view over the bus history.

use noteflow_core::event_bus::{
    EventBus, EventName, HistoryEntry, Subscription, WildcardListener,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// What a [`HistoryView`] shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryViewOptions {
    /// Only entries with one of these names; `None` keeps everything
    pub filter: Option<Vec<EventName>>,
    /// Keep at most this many of the newest matching entries
    pub limit: Option<usize>,
    /// Re-read the history after every emitted event
    pub auto_refresh: bool,
}

impl HistoryViewOptions {
    /// Restrict to `names`
    pub fn with_filter(mut self, names: impl IntoIterator<Item = EventName>) -> Self {
        self.filter = Some(names.into_iter().collect());
        self
    }

    /// Cap the number of entries
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Enable auto refresh
    pub fn auto_refresh(mut self) -> Self {
        self.auto_refresh = true;
        self
    }

    fn select(&self, entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = match &self.filter {
            Some(names) => entries
                .into_iter()
                .filter(|entry| names.contains(&entry.name()))
                .collect(),
            None => entries,
        };
        if let Some(limit) = self.limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }
        entries
    }
}

/// Snapshot of recent history kept by a view component
pub struct HistoryView {
    bus: EventBus,
    options: Arc<HistoryViewOptions>,
    entries: Arc<RwLock<Vec<HistoryEntry>>>,
    subscription: Option<Subscription>,
}

impl HistoryView {
    /// Current entries, oldest first
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().clone()
    }

    /// Number of entries in the view
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the view is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Re-read the bus history
    pub fn refresh(&self) {
        let snapshot = self.options.select(self.bus.history(None));
        *self.entries.write() = snapshot;
    }

    /// Clear the bus history and this view
    pub fn clear(&self) {
        self.bus.clear_history();
        self.entries.write().clear();
    }

    /// Options the view was created with
    pub fn options(&self) -> &HistoryViewOptions {
        &self.options
    }
}

impl Drop for HistoryView {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl std::fmt::Debug for HistoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryView")
            .field("options", &self.options)
            .field("entries", &self.len())
            .finish()
    }
}

/// Build a history view over `bus`
pub fn use_event_history(bus: &EventBus, options: HistoryViewOptions) -> HistoryView {
    let options = Arc::new(options);
    let entries = Arc::new(RwLock::new(options.select(bus.history(None))));

    let subscription = options.auto_refresh.then(|| {
        let source = bus.clone();
        let options = Arc::clone(&options);
        let entries = Arc::clone(&entries);
        bus.on_any(&WildcardListener::new(move |_, _| {
            let snapshot = options.select(source.history(None));
            *entries.write() = snapshot;
            Ok(())
        }))
    });

    HistoryView {
        bus: bus.clone(),
        options,
        entries,
        subscription,
    }
}
