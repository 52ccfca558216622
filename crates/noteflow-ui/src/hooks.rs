//! Emit and subscribe handles for view components.
//!
//! A component creates its handles when it is built and lets them drop with
//! it. [`EventHook`] ties a subscription to that lifetime and always calls
//! the most recently supplied callback, so a component can replace its
//! closure on every render without re-subscribing.

use noteflow_core::event_bus::{Event, EventBus, Listener, ListenerResult, Subscription};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Stable handle for publishing on one bus
///
/// Clones compare equal as long as they point at the same bus, so the handle
/// can sit in a dependency list without causing churn.
#[derive(Clone)]
pub struct EmitHandle {
    bus: EventBus,
}

impl EmitHandle {
    /// Publish a typed event
    pub fn emit<E: Event>(&self, payload: E) {
        self.bus.emit(payload);
    }

    /// The bus this handle publishes to
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl PartialEq for EmitHandle {
    fn eq(&self, other: &Self) -> bool {
        self.bus.same_bus(&other.bus)
    }
}

impl Eq for EmitHandle {}

impl std::fmt::Debug for EmitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitHandle").finish_non_exhaustive()
    }
}

/// Get an emit handle for `bus`
pub fn use_emit(bus: &EventBus) -> EmitHandle {
    EmitHandle { bus: bus.clone() }
}

type Callback<E> = Arc<dyn Fn(&E) -> ListenerResult + Send + Sync>;

/// Subscription bound to a component's lifetime
///
/// The bus only ever sees one listener per hook. That listener looks up the
/// current callback on each event.
pub struct EventHook<E: Event> {
    bus: EventBus,
    callback: Arc<RwLock<Callback<E>>>,
    listener: Listener<E>,
    subscription: Mutex<Option<Subscription>>,
}

impl<E: Event> EventHook<E> {
    fn new(bus: &EventBus, callback: Callback<E>) -> Self {
        let callback = Arc::new(RwLock::new(callback));
        let cell = Arc::clone(&callback);
        let listener = Listener::new(move |payload: &E| {
            // Release the cell before calling so the callback may replace itself.
            let current = Arc::clone(&*cell.read());
            current(payload)
        });

        Self {
            bus: bus.clone(),
            callback,
            listener,
            subscription: Mutex::new(None),
        }
    }

    /// Replace the callback; the registration on the bus is untouched
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        *self.callback.write() = Arc::new(callback);
    }

    /// Subscribe if not already subscribed
    pub fn mount(&self) {
        let mut slot = self.subscription.lock();
        if slot.as_ref().is_some_and(|s| s.is_active()) && self.bus.is_subscribed(&self.listener)
        {
            return;
        }
        *slot = Some(self.bus.on(&self.listener));
        tracing::trace!("Hook {} mounted for {}", self.listener.id(), E::NAME);
    }

    /// Unsubscribe; safe to call more than once
    pub fn unmount(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            tracing::trace!("Hook {} unmounted from {}", self.listener.id(), E::NAME);
        }
    }

    /// Whether the hook's listener is registered right now
    ///
    /// A hook stays mounted from its own point of view after its circuit
    /// breaker removed it; this reports what the bus actually holds.
    pub fn is_mounted(&self) -> bool {
        self.bus.is_subscribed(&self.listener)
    }

    /// The stable listener registered on the bus
    pub fn listener(&self) -> &Listener<E> {
        &self.listener
    }
}

impl<E: Event> Drop for EventHook<E> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<E: Event> std::fmt::Debug for EventHook<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHook")
            .field("event", &E::NAME)
            .field("listener", &self.listener.id())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// Subscribe `callback` to `E` for as long as the returned hook lives
pub fn use_event<E, F>(bus: &EventBus, callback: F) -> EventHook<E>
where
    E: Event,
    F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
{
    let hook = EventHook::new(bus, Arc::new(callback));
    hook.mount();
    hook
}
