//! Event Bus implementation.
//!
//! Provides the core EventBus struct and global instance for
//! application-wide event distribution.
//!
//! Dispatch is synchronous: `emit` runs every matching per-event listener in
//! registration order, then every wildcard listener, and returns. No lock is
//! held while a listener runs, so listeners may emit, subscribe or
//! unsubscribe from inside their callbacks.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;
use uuid::Uuid;

use super::circuit::{BreakerState, CircuitBreakerConfig, CircuitBreakers, FailureOutcome};
use super::events::{now_millis, AppEvent, Event, EventName, ListenerErrorEvent, SystemInitialized};
use super::history::{EventHistory, HistoryEntry};
use super::listener::{
    DeferredResult, ErasedListener, Invocation, Listener, ListenerError, ListenerId, Registration,
    WildcardListener,
};
use super::metrics::{Metrics, MetricsSnapshot};
use crate::config::EventBusConfig;
use crate::error::{EventBusError, Result};
use crate::store::HistoryStore;

/// Subscription token, used in log output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionTarget {
    Event(EventName, ListenerId),
    Wildcard(ListenerId),
    Inert,
}

/// Handle returned by [`EventBus::on`] and [`EventBus::on_any`]
///
/// Calling [`Subscription::unsubscribe`] removes the registration. Calling it
/// again does nothing. Dropping the handle does not unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    bus: Weak<BusInner>,
    target: SubscriptionTarget,
    active: AtomicBool,
}

impl Subscription {
    fn new(bus: &Arc<BusInner>, target: SubscriptionTarget) -> Self {
        Self {
            id: SubscriptionId::new(),
            bus: Arc::downgrade(bus),
            target,
            active: AtomicBool::new(true),
        }
    }

    /// A subscription that was never registered
    pub fn noop() -> Self {
        Self {
            id: SubscriptionId::new(),
            bus: Weak::new(),
            target: SubscriptionTarget::Inert,
            active: AtomicBool::new(false),
        }
    }

    /// Token for this subscription
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether `unsubscribe` has not been called yet
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove the registration this handle was created for
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let bus = EventBus { inner };
        let removed = match self.target {
            SubscriptionTarget::Event(name, listener) => bus.remove_registration(name, listener),
            SubscriptionTarget::Wildcard(listener) => bus.remove_wildcard(listener),
            SubscriptionTarget::Inert => false,
        };
        if removed && bus.inner.config.debug.subscriptions() {
            tracing::debug!("Subscription {} removed", self.id);
        }
    }
}

#[derive(Default)]
struct Registries {
    events: HashMap<EventName, Vec<Registration>>,
    wildcards: Vec<WildcardListener>,
}

impl Registries {
    fn active_listeners(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}

/// Where a failure came from; wildcard failures carry no breaker key.
type FailureSource = Option<(ListenerId, Weak<dyn ErasedListener>)>;

struct BusInner {
    config: EventBusConfig,
    registries: RwLock<Registries>,
    breakers: Mutex<CircuitBreakers>,
    history: Mutex<EventHistory>,
    metrics: Metrics,
    /// Set until `system:initialized` has gone out
    pending_announce: AtomicBool,
    fallback: OnceLock<Option<FallbackExecutor>>,
}

/// Runtime for deferred listener results emitted outside any tokio context
///
/// A current-thread runtime driven on its own thread. The thread exits when
/// the owning bus is dropped.
struct FallbackExecutor {
    handle: tokio::runtime::Handle,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl FallbackExecutor {
    fn start() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        let (shutdown, stopped) = tokio::sync::oneshot::channel::<()>();
        std::thread::Builder::new()
            .name("noteflow-deferred".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = stopped.await;
                });
            })?;
        Ok(Self {
            handle,
            _shutdown: shutdown,
        })
    }
}

/// Central event bus for application-wide event distribution
///
/// Cloning is cheap and every clone refers to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a new event bus whose history persists to `store`
    pub fn with_store(config: EventBusConfig, store: Arc<dyn HistoryStore>) -> Self {
        Self::build(config, Some(store))
    }

    /// Validate `config`, then create a bus
    pub fn try_new(config: EventBusConfig, store: Option<Arc<dyn HistoryStore>>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, store))
    }

    fn build(config: EventBusConfig, store: Option<Arc<dyn HistoryStore>>) -> Self {
        let history = match store {
            Some(store) if config.history.enabled && config.history.persist => {
                EventHistory::with_store(
                    config.history.limit,
                    store,
                    config.history.storage_key.clone(),
                )
            }
            _ => EventHistory::new(config.history.limit),
        };
        let breakers = CircuitBreakers::new(CircuitBreakerConfig::from(config.circuit_breaker));
        let pending_announce = AtomicBool::new(config.is_interactive());

        Self {
            inner: Arc::new(BusInner {
                config,
                registries: RwLock::new(Registries::default()),
                breakers: Mutex::new(breakers),
                history: Mutex::new(history),
                metrics: Metrics::default(),
                pending_announce,
                fallback: OnceLock::new(),
            }),
        }
    }

    /// Emit `system:initialized` if it has not gone out yet
    ///
    /// Hosts call this once startup subscribers are wired. A bus that never
    /// sees the call announces itself just ahead of its first emitted event.
    /// Later calls do nothing.
    pub fn ready(&self) {
        if self.inner.pending_announce.swap(false, Ordering::SeqCst) {
            self.emit(SystemInitialized);
        }
    }

    /// Publish a typed event to all subscribers
    ///
    /// Never fails. Listener errors are isolated, counted and fed to the
    /// circuit breaker; a headless bus ignores the call entirely.
    pub fn emit<E: Event>(&self, payload: E) {
        self.emit_event(payload.into_app_event());
    }

    /// Publish an already-wrapped event
    pub fn emit_event(&self, event: AppEvent) {
        let inner = &self.inner;
        if !inner.config.is_interactive() {
            return;
        }
        self.ready();

        let name = event.name();
        let started = inner.config.performance.track_emit_time.then(Instant::now);
        inner.metrics.event();

        if inner.config.debug.emissions() {
            tracing::debug!(event = %name, "{}", event.description());
        }

        if inner.config.history.enabled {
            inner.history.lock().record(&event);
        }

        let listeners: Vec<Registration> = inner
            .registries
            .read()
            .events
            .get(&name)
            .cloned()
            .unwrap_or_default();
        for registration in &listeners {
            self.dispatch(name, &event, registration);
        }

        let wildcards: Vec<WildcardListener> = inner.registries.read().wildcards.clone();
        for listener in &wildcards {
            self.dispatch_wildcard(name, &event, listener);
        }

        if let Some(started) = started {
            let elapsed = started.elapsed();
            if elapsed > inner.config.performance.slow_threshold() {
                inner.metrics.slow();
                tracing::warn!(
                    "Slow event dispatch: {} took {:?} across {} listeners",
                    name,
                    elapsed,
                    listeners.len() + wildcards.len()
                );
            }
        }
    }

    fn dispatch(&self, name: EventName, event: &AppEvent, registration: &Registration) {
        if !self.inner.breakers.lock().allow(registration.id) {
            tracing::trace!("Skipping listener {} for {}: breaker open", registration.id, name);
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| registration.listener.invoke(event)));
        let source = Some((registration.id, registration.downgrade()));
        match outcome {
            Ok(None) => {}
            Ok(Some(Invocation::Immediate(Ok(())))) => {
                self.inner.breakers.lock().record_success(registration.id);
            }
            Ok(Some(Invocation::Immediate(Err(error)))) => {
                self.handle_listener_error(name, source, error);
            }
            Ok(Some(Invocation::Deferred(future))) => self.spawn_deferred(name, source, future),
            Err(payload) => {
                self.handle_listener_error(name, source, ListenerError::from_panic(payload));
            }
        }
    }

    fn dispatch_wildcard(&self, name: EventName, event: &AppEvent, listener: &WildcardListener) {
        match panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(name, event))) {
            Ok(Invocation::Immediate(Ok(()))) => {}
            Ok(Invocation::Immediate(Err(error))) => self.handle_listener_error(name, None, error),
            Ok(Invocation::Deferred(future)) => self.spawn_deferred(name, None, future),
            Err(payload) => {
                self.handle_listener_error(name, None, ListenerError::from_panic(payload));
            }
        }
    }

    /// Drive a pending listener result without blocking the emitter
    fn spawn_deferred(&self, name: EventName, source: FailureSource, future: DeferredResult) {
        let Some(handle) = self.deferred_handle() else {
            tracing::warn!(
                "Dropping deferred listener result for {}: no async runtime",
                name
            );
            return;
        };
        let bus = self.clone();
        handle.spawn(async move {
            let result = match tokio::spawn(future).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(ListenerError::from_panic(e.into_panic())),
                Err(e) => Err(ListenerError::msg(e)),
            };
            match result {
                Ok(()) => {
                    if let Some((id, _)) = &source {
                        bus.inner.breakers.lock().record_success(*id);
                    }
                }
                Err(error) => bus.handle_listener_error(name, source, error),
            }
        });
    }

    /// The caller's runtime, or the bus's own executor when there is none
    fn deferred_handle(&self) -> Option<tokio::runtime::Handle> {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            return Some(handle);
        }
        self.inner
            .fallback
            .get_or_init(|| match FallbackExecutor::start() {
                Ok(executor) => {
                    tracing::debug!("Started executor for deferred listener results");
                    Some(executor)
                }
                Err(e) => {
                    tracing::warn!("Failed to start executor for deferred listeners: {}", e);
                    None
                }
            })
            .as_ref()
            .map(|executor| executor.handle.clone())
    }

    fn handle_listener_error(&self, name: EventName, source: FailureSource, error: ListenerError) {
        self.inner.metrics.error();
        tracing::warn!("Listener error in {}: {}", name, error);

        let Some((id, owner)) = source else {
            return;
        };
        let outcome = self.inner.breakers.lock().record_failure(id, owner);
        if outcome != FailureOutcome::Opened {
            return;
        }

        self.remove_registration(name, id);
        tracing::error!(
            "Listener {} for {} removed after {} consecutive failures",
            id,
            name,
            self.inner.config.circuit_breaker.max_failures
        );

        if name != EventName::SystemListenerError {
            self.emit(ListenerErrorEvent {
                event: name,
                error: error.to_string(),
                timestamp: now_millis(),
            });
        }
    }

    /// Subscribe a listener to its event
    ///
    /// Registering the same listener (or a clone of it) again is a no-op.
    pub fn on<E: Event>(&self, listener: &Listener<E>) -> Subscription {
        if !self.inner.config.is_interactive() {
            return Subscription::noop();
        }

        let id = listener.id();
        let count = {
            let mut registries = self.inner.registries.write();
            let set = registries.events.entry(E::NAME).or_default();
            if !set.iter().any(|r| r.id == id) {
                set.push(Registration::new(listener));
            }
            set.len()
        };
        self.check_listener_count(E::NAME.as_str(), count);

        let subscription = Subscription::new(&self.inner, SubscriptionTarget::Event(E::NAME, id));
        if self.inner.config.debug.subscriptions() {
            tracing::debug!("Subscription {} added for {}", subscription.id(), E::NAME);
        }
        subscription
    }

    /// Subscribe a listener to every event
    pub fn on_any(&self, listener: &WildcardListener) -> Subscription {
        if !self.inner.config.is_interactive() {
            return Subscription::noop();
        }

        let id = listener.id();
        let count = {
            let mut registries = self.inner.registries.write();
            if !registries.wildcards.iter().any(|l| l.id() == id) {
                registries.wildcards.push(listener.clone());
            }
            registries.wildcards.len()
        };
        self.check_listener_count("*", count);

        let subscription = Subscription::new(&self.inner, SubscriptionTarget::Wildcard(id));
        if self.inner.config.debug.subscriptions() {
            tracing::debug!("Wildcard subscription {} added", subscription.id());
        }
        subscription
    }

    fn check_listener_count(&self, target: &str, count: usize) {
        let max = self.inner.config.memory.max_listeners_per_event;
        if count == max + 1 {
            tracing::warn!(
                "{} has {} listeners (limit {}); possible subscription leak",
                target,
                count,
                max
            );
        }
    }

    /// Remove a listener from its event; absent listeners are ignored
    pub fn off<E: Event>(&self, listener: &Listener<E>) {
        self.remove_registration(E::NAME, listener.id());
    }

    /// Remove a wildcard listener; absent listeners are ignored
    pub fn off_any(&self, listener: &WildcardListener) {
        self.remove_wildcard(listener.id());
    }

    fn remove_registration(&self, name: EventName, id: ListenerId) -> bool {
        let mut registries = self.inner.registries.write();
        let Some(set) = registries.events.get_mut(&name) else {
            return false;
        };
        let before = set.len();
        set.retain(|r| r.id != id);
        let removed = set.len() != before;
        if set.is_empty() {
            registries.events.remove(&name);
        }
        removed
    }

    fn remove_wildcard(&self, id: ListenerId) -> bool {
        let mut registries = self.inner.registries.write();
        let before = registries.wildcards.len();
        registries.wildcards.retain(|l| l.id() != id);
        registries.wildcards.len() != before
    }

    /// Clear one event's listeners, or every listener including wildcards
    pub fn remove_all_listeners(&self, name: Option<EventName>) {
        {
            let mut registries = self.inner.registries.write();
            match name {
                Some(name) => {
                    registries.events.remove(&name);
                }
                None => {
                    registries.events.clear();
                    registries.wildcards.clear();
                }
            }
        }
        self.inner.breakers.lock().prune();
    }

    /// Recent history, oldest first; at most `limit` entries when given
    pub fn history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        if !self.inner.config.history.enabled {
            return Vec::new();
        }
        self.inner.history.lock().entries(limit)
    }

    /// Clear event history
    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }

    /// Snapshot of counters, listener counts and history size
    pub fn metrics(&self) -> MetricsSnapshot {
        let (active, wildcards) = {
            let registries = self.inner.registries.read();
            (registries.active_listeners(), registries.wildcards.len())
        };
        let history_size = self.inner.history.lock().len();
        self.inner.metrics.snapshot(active, wildcards, history_size)
    }

    /// Number of listeners registered for `name`
    pub fn listener_count(&self, name: EventName) -> usize {
        self.inner
            .registries
            .read()
            .events
            .get(&name)
            .map_or(0, Vec::len)
    }

    /// Number of listeners for a dynamically named event; unknown names have none
    pub fn listener_count_by_name(&self, name: &str) -> usize {
        EventName::parse(name).map_or(0, |name| self.listener_count(name))
    }

    /// Number of wildcard listeners
    pub fn wildcard_count(&self) -> usize {
        self.inner.registries.read().wildcards.len()
    }

    /// Whether `listener` is currently registered
    pub fn is_subscribed<E: Event>(&self, listener: &Listener<E>) -> bool {
        let id = listener.id();
        self.inner
            .registries
            .read()
            .events
            .get(&E::NAME)
            .is_some_and(|set| set.iter().any(|r| r.id == id))
    }

    /// Circuit breaker record for `listener`, if it has ever failed
    pub fn breaker_state<E: Event>(&self, listener: &Listener<E>) -> Option<BreakerState> {
        self.inner.breakers.lock().state(listener.id())
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    /// Whether two handles refer to the same bus
    pub fn same_bus(&self, other: &EventBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("metrics", &self.metrics())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Global event bus instance
static EVENT_BUS: RwLock<Option<EventBus>> = parking_lot::const_rwlock(None);

/// Get or initialize the global event bus
///
/// This is the primary way to access the event bus throughout the application.
pub fn event_bus() -> EventBus {
    if let Some(bus) = EVENT_BUS.read().as_ref() {
        return bus.clone();
    }
    EVENT_BUS.write().get_or_insert_with(EventBus::new).clone()
}

/// Initialize the global event bus with custom configuration
///
/// Must be called before any calls to `event_bus()`. Returns an error if
/// the event bus has already been initialized or the config is invalid.
pub fn init_event_bus(
    config: EventBusConfig,
    store: Option<Arc<dyn HistoryStore>>,
) -> Result<EventBus> {
    config.validate()?;
    let mut slot = EVENT_BUS.write();
    if slot.is_some() {
        return Err(EventBusError::AlreadyInitialized);
    }
    let bus = EventBus::build(config, store);
    *slot = Some(bus.clone());
    Ok(bus)
}

/// Drop the global event bus so the next access builds a fresh one
///
/// Intended for test isolation and hot reload. Handles obtained earlier keep
/// working against the old instance.
pub fn reset_event_bus() {
    EVENT_BUS.write().take();
}

/// Convenience macro to publish an event to the global event bus
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::event_bus::event_bus().emit($event)
    };
}

/// Convenience macro to subscribe a listener on the global event bus
#[macro_export]
macro_rules! on_event {
    ($listener:expr) => {
        $crate::event_bus::event_bus().on($listener)
    };
}
