//! Durable key-value storage for the event history.
//!
//! The history snapshot is one string value under one key, overwritten
//! wholesale on every save. Back-ends only need to move strings.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PersistenceError;

/// A string key-value store used to persist the history snapshot.
pub trait HistoryStore: Send + Sync {
    /// Read the value stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Replace the value stored under `key`
    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// In-process store
///
/// Useful for tests and for hosts that only want history to survive a bus
/// reset, not a restart. Writes can be switched off to simulate a full or
/// disabled store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one value
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store.values.write().insert(key.into(), value.into());
        store
    }

    /// Make every subsequent `save` fail with a quota error
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Raw value under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::QuotaExceeded {
                key: key.to_string(),
                bytes: value.len(),
            });
        }
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
