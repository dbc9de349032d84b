//! In-memory event dispatcher.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use serde_json::Value as JsonValue;
use tracing::{trace, warn};

use crate::dispatcher::{Dispatched, Dispatcher, Listener, Subscriber};
use crate::pattern::{glob_matches, is_wildcard};
use crate::{DispatchError, Event, Payload};

/// In-process, synchronous dispatcher.
///
/// - No IO / no async
/// - Exact-name listeners run first, then matching wildcard listeners, each in
///   registration order
/// - Listeners are cloned out of the registry before they run, so a listener
///   may dispatch or register listeners itself
/// - Pushed payloads stay queued across flushes until forgotten
#[derive(Default)]
pub struct InMemoryDispatcher {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    wildcards: RwLock<Vec<(String, Listener)>>,
    pushed: Mutex<HashMap<String, Vec<Payload>>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners_for(&self, event: &str) -> Result<Vec<Listener>, DispatchError> {
        let mut matched = self
            .listeners
            .read()
            .map_err(|_| DispatchError::Poisoned("listeners"))?
            .get(event)
            .cloned()
            .unwrap_or_default();

        let wildcards = self
            .wildcards
            .read()
            .map_err(|_| DispatchError::Poisoned("wildcard listeners"))?;
        matched.extend(
            wildcards
                .iter()
                .filter(|(pattern, _)| glob_matches(pattern, event))
                .map(|(_, listener)| listener.clone()),
        );

        Ok(matched)
    }
}

impl core::fmt::Debug for InMemoryDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let listeners = self.listeners.read().map(|l| l.len()).unwrap_or(0);
        let wildcards = self.wildcards.read().map(|w| w.len()).unwrap_or(0);
        let pushed = self.pushed.lock().map(|p| p.len()).unwrap_or(0);
        f.debug_struct("InMemoryDispatcher")
            .field("listeners", &listeners)
            .field("wildcards", &wildcards)
            .field("pushed", &pushed)
            .finish()
    }
}

impl Dispatcher for InMemoryDispatcher {
    fn dispatch(&self, event: Event, payload: Payload, halt: bool) -> Result<Dispatched, DispatchError> {
        let listeners = self.listeners_for(event.name())?;
        trace!(event = %event, listeners = listeners.len(), "dispatching");

        let mut responses = Vec::new();
        for listener in listeners {
            let response = listener(&event, &payload)
                .map_err(|source| DispatchError::listener(event.name(), source))?;

            match response.filter(|value| !value.is_null()) {
                Some(value) if halt => return Ok(Dispatched::Halted(Some(value))),
                Some(JsonValue::Bool(false)) => break,
                Some(value) => responses.push(value),
                None => {}
            }
        }

        if halt {
            Ok(Dispatched::Halted(None))
        } else {
            Ok(Dispatched::Responses(responses))
        }
    }

    fn until(&self, event: Event, payload: Payload) -> Result<Option<JsonValue>, DispatchError> {
        Ok(self.dispatch(event, payload, true)?.into_responses().into_iter().next())
    }

    fn listen(&self, event: &str, listener: Listener) {
        if is_wildcard(event) {
            match self.wildcards.write() {
                Ok(mut wildcards) => wildcards.push((event.to_string(), listener)),
                Err(_) => warn!(event, "wildcard listener registry poisoned; listener dropped"),
            }
            return;
        }

        match self.listeners.write() {
            Ok(mut listeners) => listeners.entry(event.to_string()).or_default().push(listener),
            Err(_) => warn!(event, "listener registry poisoned; listener dropped"),
        }
    }

    fn has_listeners(&self, event: &str) -> bool {
        let exact = self
            .listeners
            .read()
            .map(|l| l.get(event).is_some_and(|v| !v.is_empty()))
            .unwrap_or(false);
        exact || self.has_wildcard_listeners(event)
    }

    fn has_wildcard_listeners(&self, event: &str) -> bool {
        self.wildcards
            .read()
            .map(|w| w.iter().any(|(pattern, _)| glob_matches(pattern, event)))
            .unwrap_or(false)
    }

    fn subscribe(&self, subscriber: &dyn Subscriber) {
        subscriber.subscribe(self);
    }

    fn push(&self, event: &str, payload: Payload) {
        match self.pushed.lock() {
            Ok(mut pushed) => pushed.entry(event.to_string()).or_default().push(payload),
            Err(_) => warn!(event, "pushed queue poisoned; payload dropped"),
        }
    }

    fn flush(&self, event: &str) -> Result<(), DispatchError> {
        let payloads = self
            .pushed
            .lock()
            .map_err(|_| DispatchError::Poisoned("pushed queue"))?
            .get(event)
            .cloned()
            .unwrap_or_default();

        for payload in payloads {
            self.dispatch(Event::named(event), payload, false)?;
        }
        Ok(())
    }

    fn forget(&self, event: &str) {
        if is_wildcard(event) {
            if let Ok(mut wildcards) = self.wildcards.write() {
                wildcards.retain(|(pattern, _)| pattern != event);
            }
        } else if let Ok(mut listeners) = self.listeners.write() {
            listeners.remove(event);
        }

        if let Ok(mut pushed) = self.pushed.lock() {
            pushed.remove(event);
        }
    }

    fn forget_pushed(&self) {
        if let Ok(mut pushed) = self.pushed.lock() {
            pushed.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use crate::listener;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let sink = sink.clone();
            move |tag: &str| {
                let sink = sink.clone();
                let tag = tag.to_string();
                listener(move |_, _| {
                    sink.lock().unwrap().push(tag.clone());
                    Ok(None)
                })
            }
        };
        (sink, make)
    }

    #[test]
    fn exact_listeners_run_before_wildcards_in_registration_order() {
        let bus = InMemoryDispatcher::new();
        let (sink, make) = recorder();

        bus.listen("order.*", make("wild"));
        bus.listen("order.created", make("first"));
        bus.listen("order.created", make("second"));
        bus.listen("invoice.*", make("other"));

        bus.dispatch(Event::named("order.created"), Payload::empty(), false)
            .unwrap();
        assert_eq!(*sink.lock().unwrap(), vec!["first", "second", "wild"]);
    }

    #[test]
    fn collects_non_null_responses() {
        let bus = InMemoryDispatcher::new();
        bus.listen("q", listener(|_, _| Ok(Some(json!(1)))));
        bus.listen("q", listener(|_, _| Ok(None)));
        bus.listen("q", listener(|_, p| Ok(Some(p.data().clone()))));

        let out = bus.dispatch(Event::named("q"), Payload::new(json!("x")), false).unwrap();
        assert_eq!(out, Dispatched::Responses(vec![json!(1), json!("x")]));
    }

    #[test]
    fn false_stops_propagation() {
        let bus = InMemoryDispatcher::new();
        let (sink, make) = recorder();
        bus.listen("q", make("a"));
        bus.listen("q", listener(|_, _| Ok(Some(json!(false)))));
        bus.listen("q", make("never"));

        bus.dispatch(Event::named("q"), Payload::empty(), false).unwrap();
        assert_eq!(*sink.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn halt_returns_first_non_null_response() {
        let bus = InMemoryDispatcher::new();
        let (sink, make) = recorder();
        bus.listen("q", make("a"));
        bus.listen("q", listener(|_, _| Ok(Some(json!("answer")))));
        bus.listen("q", make("never"));

        assert_eq!(
            bus.until(Event::named("q"), Payload::empty()).unwrap(),
            Some(json!("answer"))
        );
        assert_eq!(*sink.lock().unwrap(), vec!["a"]);
        assert_eq!(
            bus.dispatch(Event::named("none"), Payload::empty(), true).unwrap(),
            Dispatched::Halted(None)
        );
    }

    #[test]
    fn listener_errors_abort_dispatch() {
        let bus = InMemoryDispatcher::new();
        let (sink, make) = recorder();
        bus.listen("q", listener(|_, _| Err(anyhow::anyhow!("smtp down"))));
        bus.listen("q", make("never"));

        let err = bus.dispatch(Event::named("q"), Payload::empty(), false).unwrap_err();
        match err {
            DispatchError::Listener { event, source } => {
                assert_eq!(event, "q");
                assert_eq!(source.to_string(), "smtp down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sink.lock().unwrap().is_empty());
    }

    #[test]
    fn listeners_may_dispatch_reentrantly() {
        let bus = Arc::new(InMemoryDispatcher::new());
        let (sink, make) = recorder();
        bus.listen("inner", make("inner"));

        let weak = Arc::downgrade(&bus);
        bus.listen(
            "outer",
            listener(move |_, _| {
                if let Some(bus) = weak.upgrade() {
                    bus.dispatch(Event::named("inner"), Payload::empty(), false)?;
                }
                Ok(None)
            }),
        );

        bus.dispatch(Event::named("outer"), Payload::empty(), false).unwrap();
        assert_eq!(*sink.lock().unwrap(), vec!["inner"]);
    }

    #[test]
    fn has_listeners_and_forget() {
        let bus = InMemoryDispatcher::new();
        let (_, make) = recorder();
        bus.listen("order.created", make("a"));
        bus.listen("invoice.*", make("b"));

        assert!(bus.has_listeners("order.created"));
        assert!(bus.has_listeners("invoice.paid"));
        assert!(bus.has_wildcard_listeners("invoice.paid"));
        assert!(!bus.has_wildcard_listeners("order.created"));
        assert!(!bus.has_listeners("order.shipped"));

        bus.forget("order.created");
        bus.forget("invoice.*");
        assert!(!bus.has_listeners("order.created"));
        assert!(!bus.has_listeners("invoice.paid"));
    }

    #[test]
    fn push_then_flush_delivers_in_push_order() {
        let bus = InMemoryDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.listen(
            "report.ready",
            listener(move |_, p| {
                sink.lock().unwrap().push(p.data().clone());
                Ok(None)
            }),
        );

        bus.push("report.ready", Payload::new(json!(1)));
        bus.push("report.ready", Payload::new(json!(2)));
        assert!(seen.lock().unwrap().is_empty());

        bus.flush("report.ready").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);

        bus.forget_pushed();
        bus.flush("report.ready").unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn subscribers_register_through_the_dispatcher() {
        struct Audit(Arc<Mutex<Vec<String>>>);

        impl Subscriber for Audit {
            fn subscribe(&self, events: &dyn Dispatcher) {
                for name in ["user.created", "user.deleted"] {
                    let sink = self.0.clone();
                    events.listen(
                        name,
                        listener(move |e, _| {
                            sink.lock().unwrap().push(e.name().to_string());
                            Ok(None)
                        }),
                    );
                }
            }
        }

        let bus = InMemoryDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(&Audit(seen.clone()));

        bus.dispatch(Event::named("user.deleted"), Payload::empty(), false)
            .unwrap();
        assert!(bus.has_listeners("user.created"));
        assert_eq!(*seen.lock().unwrap(), vec!["user.deleted"]);
    }
}
