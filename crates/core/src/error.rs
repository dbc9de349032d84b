//! Connection-layer error model.

use thiserror::Error;

/// Result type used across the connection layer.
pub type CoreResult<T> = Result<T, CoreError>;

/// Connection-level error.
///
/// Keep this focused on deterministic failures of the connection primitives.
/// Listener and dispatch failures belong to the events crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A commit or rollback was requested while no transaction was open.
    #[error("no active transaction on connection '{0}'")]
    NoActiveTransaction(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn no_active_transaction(connection: impl Into<String>) -> Self {
        Self::NoActiveTransaction(connection.into())
    }
}
