//! Pending ledger: events held back until their transaction resolves.
//!
//! Layout: `connection -> nesting level -> FIFO bucket`.
//!
//! - a connection key exists iff it holds at least one entry
//! - entries are never mutated; they leave only as a whole bucket
//!   (one level on a savepoint rollback) or as the whole connection
//!   (outer commit or outer rollback)
//!
//! The map is sharded, so connections that hash to different shards never
//! contend. A single connection is expected to be driven by one thread at a
//! time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use txevents_core::ConnectionId;

use crate::{Event, Payload};

/// A buffered `(event, payload)` pair.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event: Event,
    pub payload: Payload,
    pub queued_at: DateTime<Utc>,
}

type Buckets = BTreeMap<u32, Vec<PendingEvent>>;

#[derive(Debug, Default)]
pub struct PendingLedger {
    connections: DashMap<ConnectionId, Buckets>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the `(connection, level)` bucket.
    pub fn enqueue(&self, connection: ConnectionId, level: u32, event: Event, payload: Payload) {
        self.connections
            .entry(connection)
            .or_default()
            .entry(level)
            .or_default()
            .push(PendingEvent {
                event,
                payload,
                queued_at: Utc::now(),
            });
    }

    /// Remove the connection and return everything it held.
    ///
    /// Buckets come out in ascending level order, each in enqueue order.
    pub fn take(&self, connection: ConnectionId) -> Vec<PendingEvent> {
        self.connections
            .remove(&connection)
            .map(|(_, buckets)| buckets.into_values().flatten().collect())
            .unwrap_or_default()
    }

    /// Drop one level's bucket, returning how many entries were discarded.
    pub fn discard_level(&self, connection: ConnectionId, level: u32) -> usize {
        let discarded = match self.connections.get_mut(&connection) {
            Some(mut buckets) => buckets.remove(&level).map(|b| b.len()).unwrap_or(0),
            None => return 0,
        };
        self.connections
            .remove_if(&connection, |_, buckets| buckets.values().all(Vec::is_empty));
        discarded
    }

    /// Drop every bucket of the connection, returning how many entries were discarded.
    pub fn discard(&self, connection: ConnectionId) -> usize {
        self.connections
            .remove(&connection)
            .map(|(_, buckets)| buckets.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn has_pending(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn pending_count(&self, connection: ConnectionId) -> usize {
        self.connections
            .get(&connection)
            .map(|buckets| buckets.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Nesting levels currently holding entries for the connection.
    pub fn levels(&self, connection: ConnectionId) -> Vec<u32> {
        self.connections
            .get(&connection)
            .map(|buckets| buckets.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of connections with pending entries.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
