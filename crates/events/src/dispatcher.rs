//! Event dispatcher abstraction (listener registry + synchronous delivery).
//!
//! This is the full surface a dispatcher exposes. The transactional layer is a
//! decorator over it: it implements the same trait, intercepts `dispatch`, and
//! forwards every other operation unchanged.
//!
//! ## Delivery model
//!
//! - **Synchronous**: `dispatch` runs listeners on the caller's thread before
//!   returning (unless the event is deferred by a decorator)
//! - **In-process**: no persistence, no retries; a failed listener surfaces as
//!   an error to the caller
//! - **Ordered**: listeners run in registration order

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::{DispatchError, Event, Payload};

/// What a listener hands back: an optional response, or a failure.
///
/// Returning `Some(Value::Bool(false))` stops propagation to later listeners.
pub type ListenerResult = anyhow::Result<Option<JsonValue>>;

/// A registered listener callback.
pub type Listener = Arc<dyn Fn(&Event, &Payload) -> ListenerResult + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event, &Payload) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Outcome of a dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Listeners ran; non-null responses in listener order.
    Responses(Vec<JsonValue>),
    /// Dispatched with `halt`: the first non-null response, if any.
    Halted(Option<JsonValue>),
    /// Held back until the enclosing transaction resolves. No listener ran.
    Deferred,
}

impl Dispatched {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Dispatched::Deferred)
    }

    /// All responses, flattened (empty when deferred).
    pub fn into_responses(self) -> Vec<JsonValue> {
        match self {
            Dispatched::Responses(responses) => responses,
            Dispatched::Halted(response) => response.into_iter().collect(),
            Dispatched::Deferred => Vec::new(),
        }
    }
}

/// Registers a group of listeners in one call.
pub trait Subscriber {
    fn subscribe(&self, events: &dyn Dispatcher);
}

/// Event dispatcher (listener registry + delivery).
///
/// ## Thread Safety
///
/// Requires `Send + Sync`: a dispatcher is shared process-wide and may be used
/// from many threads concurrently.
pub trait Dispatcher: Send + Sync {
    /// Deliver `event` to its listeners.
    ///
    /// With `halt`, delivery stops at the first non-null response.
    fn dispatch(&self, event: Event, payload: Payload, halt: bool) -> Result<Dispatched, DispatchError>;

    /// Dispatch until the first non-null response.
    fn until(&self, event: Event, payload: Payload) -> Result<Option<JsonValue>, DispatchError>;

    /// Register a listener for an event name or a `*` pattern.
    fn listen(&self, event: &str, listener: Listener);

    /// Does `event` have any listeners (exact or wildcard)?
    fn has_listeners(&self, event: &str) -> bool;

    /// Does any wildcard listener match `event`?
    fn has_wildcard_listeners(&self, event: &str) -> bool;

    fn subscribe(&self, subscriber: &dyn Subscriber);

    /// Queue a payload to be dispatched later by [`Dispatcher::flush`].
    fn push(&self, event: &str, payload: Payload);

    /// Dispatch every payload pushed for `event`, in push order.
    fn flush(&self, event: &str) -> Result<(), DispatchError>;

    /// Remove the listeners (and pushed payloads) of `event`.
    fn forget(&self, event: &str);

    /// Drop every pushed payload.
    fn forget_pushed(&self);
}

impl<D> Dispatcher for Arc<D>
where
    D: Dispatcher + ?Sized,
{
    fn dispatch(&self, event: Event, payload: Payload, halt: bool) -> Result<Dispatched, DispatchError> {
        (**self).dispatch(event, payload, halt)
    }

    fn until(&self, event: Event, payload: Payload) -> Result<Option<JsonValue>, DispatchError> {
        (**self).until(event, payload)
    }

    fn listen(&self, event: &str, listener: Listener) {
        (**self).listen(event, listener)
    }

    fn has_listeners(&self, event: &str) -> bool {
        (**self).has_listeners(event)
    }

    fn has_wildcard_listeners(&self, event: &str) -> bool {
        (**self).has_wildcard_listeners(event)
    }

    fn subscribe(&self, subscriber: &dyn Subscriber) {
        (**self).subscribe(subscriber)
    }

    fn push(&self, event: &str, payload: Payload) {
        (**self).push(event, payload)
    }

    fn flush(&self, event: &str) -> Result<(), DispatchError> {
        (**self).flush(event)
    }

    fn forget(&self, event: &str) {
        (**self).forget(event)
    }

    fn forget_pushed(&self) {
        (**self).forget_pushed()
    }
}
