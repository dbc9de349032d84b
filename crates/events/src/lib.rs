//! Transaction-aware event dispatch.
//!
//! Events raised while a database transaction is open are held back and
//! delivered, in order, only after the outermost transaction commits. A
//! rollback discards them.
//!
//! ```ignore
//! let inner = Arc::new(InMemoryDispatcher::new());
//! let events = TransactionalDispatcher::new(inner);
//!
//! conn.begin_transaction();
//! events.fire(Event::named("persistence.saved: Order"), Payload::persisted(conn.clone(), order))?;
//! // nothing delivered yet
//! conn.commit()?;
//! events.fire(Event::object(TransactionCommitted::new(conn.clone())), Payload::empty())?;
//! // listeners of "persistence.saved: Order" have now run
//! ```

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod in_memory;
pub mod ledger;
pub mod lifecycle;
pub mod pattern;
pub mod payload;
pub mod transactional;

pub use classifier::{Classifier, DEFAULT_TRANSACTIONAL_PREFIX};
pub use config::{ConfigError, TransactionalEventsConfig, install};
pub use dispatcher::{Dispatched, Dispatcher, Listener, ListenerResult, Subscriber, listener};
pub use error::DispatchError;
pub use event::{Event, EventObject};
pub use in_memory::InMemoryDispatcher;
pub use ledger::{PendingEvent, PendingLedger};
pub use lifecycle::{
    LIFECYCLE_EVENT_PREFIX, TRANSACTION_COMMITTED, TRANSACTION_ROLLED_BACK, TransactionCommitted,
    TransactionRolledBack,
};
pub use payload::Payload;
pub use transactional::TransactionalDispatcher;
