//! Configuration for the transactional layer.
//!
//! Sources, in the order hosts usually reach for them:
//!
//! - `TransactionalEventsConfig::default()`
//! - JSON (`from_json_str`), e.g. a section of the host's config file
//! - environment (`from_env`): `TXEVENTS_ENABLED`, `TXEVENTS_EVENTS`,
//!   `TXEVENTS_EXCLUDED` (pattern lists are comma separated)

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::classifier::{Classifier, DEFAULT_TRANSACTIONAL_PREFIX};
use crate::dispatcher::Dispatcher;
use crate::transactional::TransactionalDispatcher;

pub const ENV_ENABLED: &str = "TXEVENTS_ENABLED";
pub const ENV_EVENTS: &str = "TXEVENTS_EVENTS";
pub const ENV_EXCLUDED: &str = "TXEVENTS_EXCLUDED";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionalEventsConfig {
    /// Install the transactional layer at all.
    pub enabled: bool,
    /// Patterns of events deferred until commit.
    pub events: Vec<String>,
    /// Patterns always delivered immediately (lifecycle signals are added implicitly).
    pub excluded: Vec<String>,
}

impl Default for TransactionalEventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            events: vec![DEFAULT_TRANSACTIONAL_PREFIX.to_string()],
            excluded: Vec::new(),
        }
    }
}

impl TransactionalEventsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_ENABLED) {
            config.enabled = parse_bool(ENV_ENABLED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_EVENTS) {
            config.events = split_patterns(&raw);
        }
        if let Some(raw) = lookup(ENV_EXCLUDED) {
            config.excluded = split_patterns(&raw);
        }

        Ok(config)
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.events.iter().cloned(), self.excluded.iter().cloned())
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Wrap `inner` according to `config`.
///
/// When disabled, `inner` is returned untouched and no lifecycle listeners
/// are registered.
pub fn install(inner: Arc<dyn Dispatcher>, config: &TransactionalEventsConfig) -> Arc<dyn Dispatcher> {
    if !config.enabled {
        debug!("transactional events disabled");
        return inner;
    }

    debug!(events = ?config.events, excluded = ?config.excluded, "installing transactional events");
    Arc::new(TransactionalDispatcher::from_config(inner, config))
}
