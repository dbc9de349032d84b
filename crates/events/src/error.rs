//! Dispatch error model.

use thiserror::Error;

/// Failure surfaced by a [`Dispatcher`](crate::Dispatcher).
///
/// There is deliberately no classification error: deciding whether an event
/// is buffered is total, and an event without a connection simply bypasses
/// buffering.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A listener failed while handling `event`.
    ///
    /// When raised during a commit flush, entries after the failing one in the
    /// same batch are not delivered and are not re-queued.
    #[error("listener for '{event}' failed: {source}")]
    Listener {
        event: String,
        #[source]
        source: anyhow::Error,
    },

    /// Internal lock poisoning.
    #[error("dispatcher state poisoned: {0}")]
    Poisoned(&'static str),
}

impl DispatchError {
    pub fn listener(event: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Listener {
            event: event.into(),
            source,
        }
    }
}
