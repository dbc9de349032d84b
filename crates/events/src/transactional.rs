//! Transactional dispatch: defer events until their transaction is durable.
//!
//! ## Why defer?
//!
//! Listeners often have effects that cannot be undone (sending mail,
//! invalidating caches, publishing to a broker). If an event raised inside a
//! transaction is delivered immediately and the transaction then rolls back,
//! the world has been told about a change that never happened.
//!
//! `TransactionalDispatcher` wraps a plain [`Dispatcher`] and:
//!
//! ```text
//! dispatch(event, payload)
//!   ├─ no connection (event or payload)        → inner.dispatch (immediately)
//!   ├─ not transactional at current level      → inner.dispatch (immediately)
//!   └─ transactional                           → ledger[connection][level].push
//!
//! TransactionCommitted(connection)
//!   ├─ connection still inside a transaction   → nothing (nested commit)
//!   └─ outermost commit                        → take ledger[connection], inner.dispatch each
//!
//! TransactionRolledBack(connection)
//!   ├─ savepoint rollback (level > 1)          → drop ledger[connection][level]
//!   └─ outermost rollback                      → drop ledger[connection]
//! ```
//!
//! ## Flush failures
//!
//! A commit flush is not atomic across listeners. The connection's entries are
//! removed from the ledger before delivery starts; if a listener fails, the
//! error is returned to the committer and the remaining entries of that batch
//! are lost. Nothing is retried.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

use txevents_core::Connection;

use crate::classifier::Classifier;
use crate::config::TransactionalEventsConfig;
use crate::dispatcher::{Dispatched, Dispatcher, Listener, Subscriber, listener};
use crate::ledger::PendingLedger;
use crate::lifecycle::{
    TRANSACTION_COMMITTED, TRANSACTION_ROLLED_BACK, TransactionCommitted, TransactionRolledBack,
};
use crate::{DispatchError, Event, Payload};

struct State<D: ?Sized> {
    classifier: RwLock<Classifier>,
    ledger: PendingLedger,
    inner: Arc<D>,
}

/// Decorator that buffers transactional events per connection and nesting
/// level, releasing them only after the outermost commit.
///
/// Construction subscribes to the lifecycle signals on the inner dispatcher.
/// Those listeners hold a weak reference, so dropping the last handle to the
/// decorator turns them into no-ops.
pub struct TransactionalDispatcher<D: Dispatcher + ?Sized + 'static> {
    state: Arc<State<D>>,
}

impl<D> TransactionalDispatcher<D>
where
    D: Dispatcher + ?Sized + 'static,
{
    /// Wrap `inner` with the default rules (buffer `persistence.` events).
    pub fn new(inner: Arc<D>) -> Self {
        Self::with_classifier(inner, Classifier::default())
    }

    pub fn from_config(inner: Arc<D>, config: &TransactionalEventsConfig) -> Self {
        Self::with_classifier(inner, config.classifier())
    }

    pub fn with_classifier(inner: Arc<D>, classifier: Classifier) -> Self {
        let state = Arc::new(State {
            classifier: RwLock::new(classifier),
            ledger: PendingLedger::new(),
            inner,
        });
        register_lifecycle_listeners(&state);
        Self { state }
    }

    /// Dispatch `event`, deferring it if it belongs to an open transaction.
    ///
    /// Returns [`Dispatched::Deferred`] when buffered; otherwise whatever the
    /// inner dispatcher returned.
    pub fn dispatch(&self, event: Event, payload: Payload, halt: bool) -> Result<Dispatched, DispatchError> {
        let connection = event
            .transactional_connection()
            .or_else(|| payload.connection().cloned());

        let Some(connection) = connection else {
            trace!(event = %event, "no connection; dispatching immediately");
            return self.state.inner.dispatch(event, payload, halt);
        };

        let level = connection.transaction_level();
        let buffer = self
            .state
            .classifier
            .read()
            .map_err(|_| DispatchError::Poisoned("classifier"))?
            .should_buffer(&event, level);

        if !buffer {
            trace!(event = %event, connection = %connection.id(), level, "dispatching immediately");
            return self.state.inner.dispatch(event, payload, halt);
        }

        debug!(event = %event, connection = %connection.id(), level, "deferring until commit");
        self.state.ledger.enqueue(connection.id(), level, event, payload);
        Ok(Dispatched::Deferred)
    }

    /// Alias of [`TransactionalDispatcher::dispatch`] without halting.
    pub fn fire(&self, event: Event, payload: Payload) -> Result<Dispatched, DispatchError> {
        self.dispatch(event, payload, false)
    }

    /// Flush the connection's pending events after a commit.
    ///
    /// No-op while the connection is still inside a transaction or when nothing
    /// is pending. Returns the number of events delivered.
    pub fn commit(&self, connection: &dyn Connection) -> Result<usize, DispatchError> {
        self.state.commit(connection)
    }

    /// Discard pending events after a rollback.
    ///
    /// Returns the number of events discarded.
    pub fn rollback(&self, connection: &dyn Connection) -> usize {
        self.state.rollback(connection)
    }

    /// Replace the included patterns.
    pub fn set_transactional_events<I>(&self, events: I) -> Result<(), DispatchError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.state
            .classifier
            .write()
            .map_err(|_| DispatchError::Poisoned("classifier"))?
            .set_included(events);
        Ok(())
    }

    /// Replace the excluded patterns (lifecycle signals stay excluded).
    pub fn set_excluded_events<E>(&self, events: E) -> Result<(), DispatchError>
    where
        E: IntoIterator,
        E::Item: Into<String>,
    {
        self.state
            .classifier
            .write()
            .map_err(|_| DispatchError::Poisoned("classifier"))?
            .set_excluded(events);
        Ok(())
    }

    /// Snapshot of the current rules.
    pub fn classifier(&self) -> Result<Classifier, DispatchError> {
        self.state
            .classifier
            .read()
            .map(|c| c.clone())
            .map_err(|_| DispatchError::Poisoned("classifier"))
    }

    pub fn ledger(&self) -> &PendingLedger {
        &self.state.ledger
    }

    pub fn has_pending(&self, connection: &dyn Connection) -> bool {
        self.state.ledger.has_pending(connection.id())
    }

    pub fn inner(&self) -> &Arc<D> {
        &self.state.inner
    }
}

impl<D> State<D>
where
    D: Dispatcher + ?Sized,
{
    fn commit(&self, connection: &dyn Connection) -> Result<usize, DispatchError> {
        let id = connection.id();

        // Only the outermost commit makes anything durable; an enclosing
        // transaction could still roll back a nested one.
        let level = connection.transaction_level();
        if level > 0 {
            trace!(connection = %id, level, "nested commit; keeping pending events");
            return Ok(0);
        }

        let pending = self.ledger.take(id);
        if pending.is_empty() {
            return Ok(0);
        }

        let total = pending.len();
        debug!(connection = %id, pending = total, "flushing pending events");

        for (delivered, entry) in pending.into_iter().enumerate() {
            let held_ms = (Utc::now() - entry.queued_at).num_milliseconds();
            trace!(connection = %id, event = %entry.event, held_ms, "delivering");

            if let Err(err) = self.inner.dispatch(entry.event, entry.payload, false) {
                warn!(
                    connection = %id,
                    delivered,
                    dropped = total - delivered - 1,
                    error = %err,
                    "listener failed during flush; remaining events dropped"
                );
                return Err(err);
            }
        }

        Ok(total)
    }

    fn rollback(&self, connection: &dyn Connection) -> usize {
        let id = connection.id();
        // The level that was just rolled back.
        let level = connection.transaction_level() + 1;

        let discarded = if level > 1 {
            self.ledger.discard_level(id, level)
        } else {
            self.ledger.discard(id)
        };

        if discarded > 0 {
            debug!(connection = %id, level, discarded, "discarded pending events on rollback");
        }
        discarded
    }
}

fn register_lifecycle_listeners<D>(state: &Arc<State<D>>)
where
    D: Dispatcher + ?Sized + 'static,
{
    let weak = Arc::downgrade(state);
    state.inner.listen(
        TRANSACTION_COMMITTED,
        listener(move |event, payload| {
            let Some(state) = weak.upgrade() else {
                return Ok(None);
            };
            let connection = event
                .downcast_ref::<TransactionCommitted>()
                .map(|signal| signal.connection.clone())
                .or_else(|| payload.connection().cloned());
            if let Some(connection) = connection {
                state.commit(connection.as_ref())?;
            }
            Ok(None)
        }),
    );

    let weak = Arc::downgrade(state);
    state.inner.listen(
        TRANSACTION_ROLLED_BACK,
        listener(move |event, payload| {
            let Some(state) = weak.upgrade() else {
                return Ok(None);
            };
            let connection = event
                .downcast_ref::<TransactionRolledBack>()
                .map(|signal| signal.connection.clone())
                .or_else(|| payload.connection().cloned());
            if let Some(connection) = connection {
                state.rollback(connection.as_ref());
            }
            Ok(None)
        }),
    );
}

impl<D> Clone for TransactionalDispatcher<D>
where
    D: Dispatcher + ?Sized + 'static,
{
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<D> core::fmt::Debug for TransactionalDispatcher<D>
where
    D: Dispatcher + ?Sized + 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransactionalDispatcher")
            .field("classifier", &self.state.classifier)
            .field("pending_connections", &self.state.ledger.connection_count())
            .finish_non_exhaustive()
    }
}

impl<D> Dispatcher for TransactionalDispatcher<D>
where
    D: Dispatcher + ?Sized + 'static,
{
    fn dispatch(&self, event: Event, payload: Payload, halt: bool) -> Result<Dispatched, DispatchError> {
        TransactionalDispatcher::dispatch(self, event, payload, halt)
    }

    fn until(&self, event: Event, payload: Payload) -> Result<Option<JsonValue>, DispatchError> {
        self.state.inner.until(event, payload)
    }

    fn listen(&self, event: &str, listener: Listener) {
        self.state.inner.listen(event, listener)
    }

    fn has_listeners(&self, event: &str) -> bool {
        self.state.inner.has_listeners(event)
    }

    fn has_wildcard_listeners(&self, event: &str) -> bool {
        self.state.inner.has_wildcard_listeners(event)
    }

    fn subscribe(&self, subscriber: &dyn Subscriber) {
        self.state.inner.subscribe(subscriber)
    }

    fn push(&self, event: &str, payload: Payload) {
        self.state.inner.push(event, payload)
    }

    fn flush(&self, event: &str) -> Result<(), DispatchError> {
        self.state.inner.flush(event)
    }

    fn forget(&self, event: &str) {
        self.state.inner.forget(event)
    }

    fn forget_pushed(&self) {
        self.state.inner.forget_pushed()
    }
}
