//! Per-listener circuit breakers.
//!
//! Each per-event listener gets a failure record keyed by its identity. The
//! table holds only weak references to listeners, so a breaker never keeps a
//! dropped listener alive, and it outlives removal from the registry so a
//! listener that is re-registered later is still recognised.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::listener::{ErasedListener, ListenerId};

/// Default number of consecutive failures before a breaker opens.
pub const DEFAULT_MAX_FAILURES: u32 = 5;

/// Default delay before an open breaker may close again.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Listener is invoked normally
    Closed,
    /// Listener is skipped
    Open,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub max_failures: u32,
    /// Time since the last failure after which an open breaker closes
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

/// Failure record for one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerState {
    /// Consecutive failures since the last success or reset.
    pub failures: u32,
    /// When the most recent failure happened.
    pub last_failure_at: Option<Instant>,
    /// Whether dispatch to the listener is currently skipped.
    pub is_open: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            failures: 0,
            last_failure_at: None,
            is_open: false,
        }
    }

    /// The state as an enum
    pub fn circuit_state(&self) -> CircuitState {
        if self.is_open {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure counted, breaker still closed. Carries the running count.
    Counted(u32),
    /// This failure reached the threshold and opened the breaker.
    Opened,
    /// The breaker was already open.
    AlreadyOpen,
}

/// Aggregate view over every tracked breaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    /// Breakers with a live listener.
    pub tracked: usize,
    /// Breakers currently open.
    pub open: usize,
}

struct Entry {
    owner: Weak<dyn ErasedListener>,
    state: BreakerState,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// Identity-keyed breaker table scoped to one bus.
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    entries: HashMap<ListenerId, Entry>,
}

impl CircuitBreakers {
    /// Create an empty table
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    fn live_entry(&mut self, id: ListenerId) -> Option<&mut Entry> {
        if self.entries.get(&id).is_some_and(|e| !e.is_live()) {
            // Identity reused by a new allocation; the old record is dead.
            self.entries.remove(&id);
        }
        self.entries.get_mut(&id)
    }

    /// Whether dispatch to `id` may proceed
    ///
    /// An open breaker whose reset timeout has elapsed since the last failure
    /// is closed here, with its failure count cleared.
    pub fn allow(&mut self, id: ListenerId) -> bool {
        self.allow_at(id, Instant::now())
    }

    pub(crate) fn allow_at(&mut self, id: ListenerId, now: Instant) -> bool {
        let reset_timeout = self.config.reset_timeout;
        let Some(entry) = self.live_entry(id) else {
            return true;
        };
        if !entry.state.is_open {
            return true;
        }
        let elapsed = entry
            .state
            .last_failure_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(Duration::MAX);
        if elapsed > reset_timeout {
            tracing::info!("Circuit breaker for listener {} closing", id);
            entry.state = BreakerState::closed();
            true
        } else {
            false
        }
    }

    /// Record a successful invocation; clears the failure count
    pub fn record_success(&mut self, id: ListenerId) {
        if let Some(entry) = self.live_entry(id) {
            if !entry.state.is_open {
                entry.state.failures = 0;
            }
        }
    }

    /// Record a failed invocation of the listener `owner` points at
    pub(crate) fn record_failure(
        &mut self,
        id: ListenerId,
        owner: Weak<dyn ErasedListener>,
    ) -> FailureOutcome {
        self.record_failure_at(id, owner, Instant::now())
    }

    pub(crate) fn record_failure_at(
        &mut self,
        id: ListenerId,
        owner: Weak<dyn ErasedListener>,
        now: Instant,
    ) -> FailureOutcome {
        let max_failures = self.config.max_failures;
        if self.live_entry(id).is_none() {
            self.entries.insert(
                id,
                Entry {
                    owner,
                    state: BreakerState::closed(),
                },
            );
        }
        let Some(entry) = self.entries.get_mut(&id) else {
            return FailureOutcome::Counted(0);
        };

        entry.state.last_failure_at = Some(now);
        if entry.state.is_open {
            return FailureOutcome::AlreadyOpen;
        }

        entry.state.failures = entry.state.failures.saturating_add(1);
        if entry.state.failures >= max_failures {
            tracing::warn!(
                "Circuit breaker for listener {} opening after {} failures",
                id,
                entry.state.failures
            );
            entry.state.is_open = true;
            FailureOutcome::Opened
        } else {
            FailureOutcome::Counted(entry.state.failures)
        }
    }

    /// Current record for `id`, if one is tracked
    pub fn state(&self, id: ListenerId) -> Option<BreakerState> {
        self.entries
            .get(&id)
            .filter(|e| e.is_live())
            .map(|e| e.state)
    }

    /// Drop records whose listeners no longer exist
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live());
        before - self.entries.len()
    }

    /// Aggregate counts over live records
    pub fn stats(&self) -> CircuitBreakerStats {
        self.entries
            .values()
            .filter(|e| e.is_live())
            .fold(CircuitBreakerStats::default(), |mut stats, e| {
                stats.tracked += 1;
                if e.state.is_open {
                    stats.open += 1;
                }
                stats
            })
    }
}

impl std::fmt::Debug for CircuitBreakers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakers")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
