use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use txevents_core::Connection;

/// Data delivered to listeners alongside an event.
///
/// A payload may be bound to the connection it was produced on (a persisted
/// entity). That binding is how a plain named event such as
/// `"persistence.saved"` finds the transaction it belongs to.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    data: JsonValue,
    connection: Option<Arc<dyn Connection>>,
}

impl Payload {
    pub fn new(data: impl Into<JsonValue>) -> Self {
        Self {
            data: data.into(),
            connection: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Payload for an entity persisted through `connection`.
    pub fn persisted(connection: Arc<dyn Connection>, data: impl Into<JsonValue>) -> Self {
        Self {
            data: data.into(),
            connection: Some(connection),
        }
    }

    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    pub fn with_connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn into_data(self) -> JsonValue {
        self.data
    }

    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.connection.as_ref()
    }
}

impl From<JsonValue> for Payload {
    fn from(value: JsonValue) -> Self {
        Self::new(value)
    }
}
