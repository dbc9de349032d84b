use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;

use txevents_core::Connection;

/// A structured event value.
///
/// Object events are identified by [`EventObject::name`], which defaults to the
/// Rust type name (e.g. `"app::orders::OrderShipped"`), so namespace patterns
/// such as `"app::orders::"` or `"app::*"` match them.
///
/// ## Self-describing transactional events
///
/// An event that knows which connection produced it returns it from
/// [`EventObject::transactional_connection`]. Such an event is buffered while
/// that connection is inside a transaction even when no configured pattern
/// matches its name (exclusions still win).
pub trait EventObject: Any + Send + Sync + core::fmt::Debug {
    /// Stable event identity used for classification and listener lookup.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// The connection this event originated from, if it carries one.
    fn transactional_connection(&self) -> Option<Arc<dyn Connection>> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// An event as accepted by a dispatcher: a plain name, or a structured value.
#[derive(Debug, Clone)]
pub enum Event {
    Named(String),
    Object(Arc<dyn EventObject>),
}

impl Event {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn object<E: EventObject>(event: E) -> Self {
        Self::Object(Arc::new(event))
    }

    /// Identity string: the explicit name, or the object's declared name.
    pub fn name(&self) -> &str {
        match self {
            Event::Named(name) => name,
            Event::Object(obj) => obj.name(),
        }
    }

    /// Connection declared by a self-describing transactional event.
    pub fn transactional_connection(&self) -> Option<Arc<dyn Connection>> {
        match self {
            Event::Named(_) => None,
            Event::Object(obj) => obj.transactional_connection(),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Event::Object(_))
    }

    /// Borrow the structured value as a concrete type.
    pub fn downcast_ref<T: EventObject>(&self) -> Option<&T> {
        match self {
            Event::Named(_) => None,
            Event::Object(obj) => obj.as_any().downcast_ref::<T>(),
        }
    }
}

impl From<&str> for Event {
    fn from(value: &str) -> Self {
        Event::Named(value.to_string())
    }
}

impl From<String> for Event {
    fn from(value: String) -> Self {
        Event::Named(value)
    }
}

impl From<Cow<'_, str>> for Event {
    fn from(value: Cow<'_, str>) -> Self {
        Event::Named(value.into_owned())
    }
}

impl core::fmt::Display for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
