//! Bounded event history with optional persistence.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use super::events::{now_millis, AppEvent, EventName};
use crate::error::PersistenceError;
use crate::store::HistoryStore;

/// One recorded emission
///
/// Serializes as `{ "id", "event", "data", "timestamp" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique within the buffer, built from name, time and a counter.
    pub id: String,
    /// The event name and payload.
    #[serde(flatten)]
    pub event: AppEvent,
    /// Epoch milliseconds when the event was recorded.
    pub timestamp: i64,
}

impl HistoryEntry {
    /// Name of the recorded event
    pub fn name(&self) -> EventName {
        self.event.name()
    }
}

struct StoreBinding {
    store: Arc<dyn HistoryStore>,
    key: String,
}

/// Bounded FIFO of recent events.
pub struct EventHistory {
    limit: usize,
    entries: VecDeque<HistoryEntry>,
    counter: u64,
    store: Option<StoreBinding>,
}

impl EventHistory {
    /// Create an in-memory history holding at most `limit` entries
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: VecDeque::with_capacity(limit.min(1024)),
            counter: 0,
            store: None,
        }
    }

    /// Create a history backed by `store`, rehydrating from `key` once
    ///
    /// A missing, unreadable or malformed snapshot leaves the history empty.
    /// Individual entries naming unknown events are skipped.
    pub fn with_store(limit: usize, store: Arc<dyn HistoryStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut history = Self::new(limit);
        history.entries = load_snapshot(store.as_ref(), &key);
        history.trim();
        tracing::debug!(
            "Rehydrated {} history entries from '{}'",
            history.entries.len(),
            key
        );
        history.store = Some(StoreBinding { store, key });
        history
    }

    /// Append an event, evict the oldest beyond the limit, then persist
    pub fn record(&mut self, event: &AppEvent) -> HistoryEntry {
        let timestamp = now_millis();
        self.counter += 1;
        let entry = HistoryEntry {
            id: format!("{}-{}-{}", event.name(), timestamp, self.counter),
            event: event.clone(),
            timestamp,
        };
        self.entries.push_back(entry.clone());
        self.trim();
        self.persist();
        entry
    }

    /// The most recent `limit` entries (or all) in emission order
    pub fn entries(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let take = limit.unwrap_or(self.entries.len()).min(self.entries.len());
        self.entries
            .iter()
            .skip(self.entries.len() - take)
            .cloned()
            .collect()
    }

    /// Remove every entry and restart the id counter
    pub fn clear(&mut self) {
        self.entries.clear();
        self.counter = 0;
        self.persist();
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn trim(&mut self) {
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    fn persist(&self) {
        let Some(binding) = &self.store else {
            return;
        };
        let snapshot: Vec<&HistoryEntry> = self.entries.iter().collect();
        let result = serde_json::to_string(&snapshot)
            .map_err(PersistenceError::from)
            .and_then(|json| binding.store.save(&binding.key, &json));
        if let Err(e) = result {
            tracing::warn!("Failed to persist event history to '{}': {}", binding.key, e);
        }
    }
}

fn load_snapshot(store: &dyn HistoryStore, key: &str) -> VecDeque<HistoryEntry> {
    let raw = match store.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return VecDeque::new(),
        Err(e) => {
            tracing::warn!("Failed to load event history from '{}': {}", key, e);
            return VecDeque::new();
        }
    };
    let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!("Ignoring malformed event history in '{}': {}", key, e);
            return VecDeque::new();
        }
    };
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<HistoryEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Skipping unreadable history entry: {}", e);
                None
            }
        })
        .collect()
}

impl std::fmt::Debug for EventHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHistory")
            .field("limit", &self.limit)
            .field("len", &self.entries.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
