//! Transaction lifecycle signals.
//!
//! The host persistence layer dispatches these after a transaction outcome is
//! final on a connection. The transactional dispatcher listens for them on the
//! underlying dispatcher and flushes or discards pending events in response.
//! They are always excluded from buffering: a buffered commit signal would
//! never be delivered.

use std::any::Any;
use std::sync::Arc;

use txevents_core::Connection;

use crate::EventObject;

/// Namespace shared by all lifecycle signals (mandatory exclusion).
pub const LIFECYCLE_EVENT_PREFIX: &str = "database.transaction.";

pub const TRANSACTION_COMMITTED: &str = "database.transaction.committed";
pub const TRANSACTION_ROLLED_BACK: &str = "database.transaction.rolled_back";

/// A transaction committed on `connection`.
///
/// Dispatch after every commit, nested ones included; the connection's level
/// must already reflect the commit.
#[derive(Debug, Clone)]
pub struct TransactionCommitted {
    pub connection: Arc<dyn Connection>,
}

impl TransactionCommitted {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self { connection }
    }
}

impl EventObject for TransactionCommitted {
    fn name(&self) -> &str {
        TRANSACTION_COMMITTED
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A transaction (or savepoint) rolled back on `connection`.
#[derive(Debug, Clone)]
pub struct TransactionRolledBack {
    pub connection: Arc<dyn Connection>,
}

impl TransactionRolledBack {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self { connection }
    }
}

impl EventObject for TransactionRolledBack {
    fn name(&self) -> &str {
        TRANSACTION_ROLLED_BACK
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
