//! Listener handles and invocation outcomes.
//!
//! A listener is a callback wrapped in a reference-counted handle. Cloning
//! the handle keeps the same identity, so registering a clone twice is the
//! same as registering the original twice. The bus keys its registries and
//! circuit breakers by that identity.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use super::events::{AppEvent, Event, EventName};

/// Error reported by a listener callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// The callback returned an error.
    #[error("{0}")]
    Failed(String),
    /// The callback panicked.
    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    /// Create a failure from any displayable message
    pub fn msg(message: impl std::fmt::Display) -> Self {
        ListenerError::Failed(message.to_string())
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ListenerError::Panicked(message)
    }
}

impl From<anyhow::Error> for ListenerError {
    fn from(err: anyhow::Error) -> Self {
        ListenerError::Failed(format!("{:#}", err))
    }
}

/// Result of a listener callback.
pub type ListenerResult = Result<(), ListenerError>;

/// A pending listener result.
pub type DeferredResult = Pin<Box<dyn Future<Output = ListenerResult> + Send + 'static>>;

/// What a listener produced when invoked.
pub enum Invocation {
    /// The callback finished synchronously.
    Immediate(ListenerResult),
    /// The callback returned work that completes later.
    Deferred(DeferredResult),
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invocation::Immediate(result) => f.debug_tuple("Immediate").field(result).finish(),
            Invocation::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<ListenerResult> for Invocation {
    fn from(result: ListenerResult) -> Self {
        Invocation::Immediate(result)
    }
}

/// Identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(usize);

impl ListenerId {
    fn of<T: ?Sized>(ptr: &Arc<T>) -> Self {
        Self(Arc::as_ptr(ptr) as *const () as usize)
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{:x}", self.0)
    }
}

/// Type-erased per-event listener as stored by the bus.
pub(crate) trait ErasedListener: Send + Sync {
    /// Invoke with the event, or `None` if the payload is not this listener's type.
    fn invoke(&self, event: &AppEvent) -> Option<Invocation>;
}

type TypedCallback<E> = dyn Fn(&E) -> Invocation + Send + Sync;

struct TypedListener<E: Event> {
    callback: Box<TypedCallback<E>>,
}

impl<E: Event> ErasedListener for TypedListener<E> {
    fn invoke(&self, event: &AppEvent) -> Option<Invocation> {
        E::from_app_event(event).map(|payload| (self.callback)(payload))
    }
}

/// Handle to a callback for one event type.
pub struct Listener<E: Event> {
    inner: Arc<TypedListener<E>>,
}

impl<E: Event> Listener<E> {
    /// Create a listener whose callback completes synchronously
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        Self::from_invocation(move |payload| Invocation::Immediate(callback(payload)))
    }

    /// Create a listener whose callback returns a pending result
    ///
    /// The bus never waits for the future; it is driven on the current
    /// tokio runtime and any error it resolves to is handled like a
    /// synchronous failure.
    pub fn deferred<F, Fut>(callback: F) -> Self
    where
        F: Fn(&E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        Self::from_invocation(move |payload| Invocation::Deferred(Box::pin(callback(payload))))
    }

    /// Create a listener from a callback that decides per call
    pub fn from_invocation<F>(callback: F) -> Self
    where
        F: Fn(&E) -> Invocation + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TypedListener {
                callback: Box::new(callback),
            }),
        }
    }

    /// Identity shared by every clone of this handle
    pub fn id(&self) -> ListenerId {
        ListenerId::of(&self.inner)
    }

    pub(crate) fn erased(&self) -> Arc<dyn ErasedListener> {
        self.inner.clone()
    }
}

impl<E: Event> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Event> PartialEq for Listener<E> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E: Event> Eq for Listener<E> {}

impl<E: Event> std::fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("event", &E::NAME)
            .field("id", &self.id())
            .finish()
    }
}

type WildcardCallback = dyn Fn(EventName, &AppEvent) -> Invocation + Send + Sync;

/// Handle to a callback that receives every event.
#[derive(Clone)]
pub struct WildcardListener {
    inner: Arc<WildcardCallback>,
}

impl WildcardListener {
    /// Create a wildcard listener whose callback completes synchronously
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(EventName, &AppEvent) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |name: EventName, event: &AppEvent| {
                Invocation::Immediate(callback(name, event))
            }),
        }
    }

    /// Create a wildcard listener whose callback returns a pending result
    pub fn deferred<F, Fut>(callback: F) -> Self
    where
        F: Fn(EventName, &AppEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |name: EventName, event: &AppEvent| {
                Invocation::Deferred(Box::pin(callback(name, event)))
            }),
        }
    }

    /// Identity shared by every clone of this handle
    pub fn id(&self) -> ListenerId {
        ListenerId::of(&self.inner)
    }

    pub(crate) fn invoke(&self, name: EventName, event: &AppEvent) -> Invocation {
        (self.inner)(name, event)
    }
}

impl PartialEq for WildcardListener {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for WildcardListener {}

impl std::fmt::Debug for WildcardListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WildcardListener")
            .field("id", &self.id())
            .finish()
    }
}

/// A per-event registration held by the bus.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) id: ListenerId,
    pub(crate) listener: Arc<dyn ErasedListener>,
}

impl Registration {
    pub(crate) fn new<E: Event>(listener: &Listener<E>) -> Self {
        Self {
            id: listener.id(),
            listener: listener.erased(),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn ErasedListener> {
        Arc::downgrade(&self.listener)
    }
}
