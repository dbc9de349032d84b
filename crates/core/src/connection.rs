//! Connection provider abstraction.
//!
//! The event layer never inspects connection internals. It asks exactly two
//! questions of a connection: who are you, and how deeply nested is your
//! current transaction?

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use crate::error::{CoreError, CoreResult};
use crate::id::ConnectionId;

/// A logical database connection, as seen by the transactional event layer.
///
/// ## Nesting level
///
/// `transaction_level()` reports the number of currently open transactions,
/// counting savepoints / nested transactions:
///
/// - `0` means no transaction is open
/// - every `BEGIN` (including nested ones) increments it
/// - every `COMMIT` / `ROLLBACK` decrements it
///
/// The level must already reflect the outcome by the time commit/rollback
/// signals are delivered to the event layer.
pub trait Connection: Send + Sync + core::fmt::Debug {
    /// Stable identity, used as the pending ledger key.
    fn id(&self) -> ConnectionId;

    /// Current transaction nesting depth.
    fn transaction_level(&self) -> u32;

    /// Human-readable connection name (for logs only).
    fn name(&self) -> &str {
        "default"
    }
}

/// Thread-safe connection that only tracks transaction nesting.
///
/// Intended for tests/dev and for hosts whose real connection type cannot
/// implement [`Connection`] directly (wrap it and mirror BEGIN/COMMIT/ROLLBACK).
#[derive(Debug)]
pub struct TrackedConnection {
    id: ConnectionId,
    name: String,
    level: AtomicU32,
}

impl TrackedConnection {
    pub fn new() -> Self {
        Self::with_id(ConnectionId::new())
    }

    pub fn with_id(id: ConnectionId) -> Self {
        Self {
            id,
            name: "default".to_string(),
            level: AtomicU32::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Open a (possibly nested) transaction, returning the new level.
    pub fn begin_transaction(&self) -> u32 {
        let level = self.level.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(connection = %self.id, level, "begin transaction");
        level
    }

    /// Commit the innermost transaction, returning the new level.
    pub fn commit(&self) -> CoreResult<u32> {
        let level = self.decrement()?;
        trace!(connection = %self.id, level, "commit transaction");
        Ok(level)
    }

    /// Roll back the innermost transaction, returning the new level.
    pub fn rollback(&self) -> CoreResult<u32> {
        let level = self.decrement()?;
        trace!(connection = %self.id, level, "rollback transaction");
        Ok(level)
    }

    fn decrement(&self) -> CoreResult<u32> {
        self.level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |l| l.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| CoreError::no_active_transaction(self.name.clone()))
    }
}

impl Default for TrackedConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for TrackedConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn transaction_level(&self) -> u32 {
        self.level.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_nesting() {
        let conn = TrackedConnection::new();
        assert_eq!(conn.transaction_level(), 0);
        assert_eq!(conn.begin_transaction(), 1);
        assert_eq!(conn.begin_transaction(), 2);
        assert_eq!(conn.commit().unwrap(), 1);
        assert_eq!(conn.rollback().unwrap(), 0);
        assert_eq!(conn.transaction_level(), 0);
    }

    #[test]
    fn refuses_to_underflow() {
        let conn = TrackedConnection::new().with_name("reporting");
        let err = conn.commit().unwrap_err();
        assert_eq!(err, CoreError::NoActiveTransaction("reporting".to_string()));
        assert!(conn.rollback().is_err());
        assert_eq!(conn.transaction_level(), 0);
    }

    #[test]
    fn id_is_stable() {
        let id = ConnectionId::new();
        let conn = TrackedConnection::with_id(id);
        assert_eq!(conn.id(), id);
        assert_eq!(conn.id(), conn.id());
        assert_eq!(conn.name(), "default");
    }
}
