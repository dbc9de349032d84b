//! `txevents-core` — connection primitives for the transactional event layer.
//!
//! This crate knows nothing about events. It only models what the event layer
//! needs to ask of a database connection: a stable identity and the current
//! transaction nesting level.

pub mod connection;
pub mod error;
pub mod id;

pub use connection::{Connection, TrackedConnection};
pub use error::{CoreError, CoreResult};
pub use id::ConnectionId;
