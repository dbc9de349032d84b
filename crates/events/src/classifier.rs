//! Decides which events are deferred until their transaction resolves.

use crate::Event;
use crate::lifecycle::LIFECYCLE_EVENT_PREFIX;
use crate::pattern::pattern_matches;

/// Prefix that marks all persistence-layer lifecycle events
/// (`"persistence.saved: Order"`, `"persistence.deleted: Invoice"`, ...).
pub const DEFAULT_TRANSACTIONAL_PREFIX: &str = "persistence.";

/// Include/exclude rule set for transactional events.
///
/// ## Evaluation order
///
/// 1. No open transaction (`level < 1`): never buffered.
/// 2. `excluded`, in list order: first match means deliver immediately.
/// 3. `included`, in list order: first match means buffer.
/// 4. A self-describing transactional event (one that carries its own
///    connection) is buffered even without a matching include.
/// 5. Otherwise: deliver immediately.
///
/// The exclusion list always starts with the lifecycle namespace, whatever the
/// caller configures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    included: Vec<String>,
    excluded: Vec<String>,
}

impl Classifier {
    pub fn new<I, E>(included: I, excluded: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        let mut classifier = Self {
            included: Vec::new(),
            excluded: Vec::new(),
        };
        classifier.set_included(included);
        classifier.set_excluded(excluded);
        classifier
    }

    /// Replace the included patterns.
    pub fn set_included<I>(&mut self, patterns: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.included = patterns.into_iter().map(Into::into).collect();
    }

    /// Replace the excluded patterns (the lifecycle exclusion is re-seeded).
    pub fn set_excluded<E>(&mut self, patterns: E)
    where
        E: IntoIterator,
        E::Item: Into<String>,
    {
        self.excluded = std::iter::once(LIFECYCLE_EVENT_PREFIX.to_string())
            .chain(patterns.into_iter().map(Into::into))
            .collect();
    }

    pub fn included(&self) -> &[String] {
        &self.included
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Should `event`, raised at transaction nesting `level`, be buffered?
    pub fn should_buffer(&self, event: &Event, level: u32) -> bool {
        if level < 1 {
            return false;
        }
        self.is_transactional(event)
    }

    /// Level-independent part of the decision.
    pub fn is_transactional(&self, event: &Event) -> bool {
        let name = event.name();

        if self.excluded.iter().any(|p| pattern_matches(p, name)) {
            return false;
        }

        if self.included.iter().any(|p| pattern_matches(p, name)) {
            return true;
        }

        event.transactional_connection().is_some()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new([DEFAULT_TRANSACTIONAL_PREFIX], std::iter::empty::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::Arc;

    use txevents_core::{Connection, TrackedConnection};

    use crate::EventObject;
    use crate::lifecycle::{TRANSACTION_COMMITTED, TransactionCommitted};

    #[derive(Debug)]
    struct InvoiceIssued {
        connection: Arc<dyn Connection>,
    }

    impl EventObject for InvoiceIssued {
        fn name(&self) -> &str {
            "billing.invoice.issued"
        }

        fn transactional_connection(&self) -> Option<Arc<dyn Connection>> {
            Some(self.connection.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn none() -> std::iter::Empty<String> {
        std::iter::empty()
    }

    #[test]
    fn nothing_is_buffered_outside_a_transaction() {
        let classifier = Classifier::new(["*"], none());
        assert!(!classifier.should_buffer(&Event::named("anything"), 0));
        assert!(classifier.should_buffer(&Event::named("anything"), 1));
        assert!(classifier.should_buffer(&Event::named("anything"), 3));
    }

    #[test]
    fn default_buffers_persistence_events_only() {
        let classifier = Classifier::default();
        assert!(classifier.should_buffer(&Event::named("persistence.saved: Order"), 1));
        assert!(!classifier.should_buffer(&Event::named("order.created"), 1));
        assert_eq!(classifier.excluded(), &[LIFECYCLE_EVENT_PREFIX.to_string()]);
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let classifier = Classifier::new(["foo/*"], ["foo/bar"]);
        assert!(!classifier.should_buffer(&Event::named("foo/bar"), 1));
        assert!(classifier.should_buffer(&Event::named("foo/zen"), 1));
    }

    #[test]
    fn lifecycle_signals_are_always_excluded() {
        let conn: Arc<dyn Connection> = Arc::new(TrackedConnection::new());
        let mut classifier = Classifier::new(["*"], none());
        classifier.set_excluded(["noise"]);

        let committed = Event::object(TransactionCommitted::new(conn));
        assert!(!classifier.should_buffer(&committed, 1));
        assert!(!classifier.should_buffer(&Event::named(TRANSACTION_COMMITTED), 1));
        assert_eq!(classifier.excluded().len(), 2);
    }

    #[test]
    fn unmatched_events_are_delivered_immediately() {
        let classifier = Classifier::new(["bar"], none());
        assert!(!classifier.should_buffer(&Event::named("foo"), 1));

        let classifier = Classifier::new(["foo/*"], none());
        assert!(!classifier.should_buffer(&Event::named("foo"), 1));
        assert!(classifier.should_buffer(&Event::named("foo/bar"), 1));
    }

    #[test]
    fn self_describing_events_opt_in() {
        let conn: Arc<dyn Connection> = Arc::new(TrackedConnection::new());
        let event = Event::object(InvoiceIssued { connection: conn });

        let classifier = Classifier::new(["persistence."], none());
        assert!(classifier.should_buffer(&event, 1));
        assert!(!classifier.should_buffer(&event, 0));

        let classifier = Classifier::new(["persistence."], ["billing."]);
        assert!(!classifier.should_buffer(&event, 1));
    }

    #[derive(Debug)]
    struct OrderShipped;

    impl EventObject for OrderShipped {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn object_events_match_on_type_namespace() {
        let event = Event::object(OrderShipped);

        let classifier = Classifier::new(["txevents_events::classifier::*"], none());
        assert!(classifier.should_buffer(&event, 1));

        let classifier = Classifier::new(["txevents_events::classifier::"], none());
        assert!(classifier.should_buffer(&event, 1));

        let classifier = Classifier::new(["app::*"], none());
        assert!(!classifier.should_buffer(&event, 1));
    }
}
