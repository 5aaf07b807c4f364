use serde::Deserialize;

use todosync_core::Millis;

use crate::error::EngineError;

pub const DEFAULT_DEBOUNCE_MS: Millis = 1_000;

pub const UPDATE_DEBOUNCE_ENV: &str = "TODOSYNC_UPDATE_DEBOUNCE_MS";
pub const DELETE_DEBOUNCE_ENV: &str = "TODOSYNC_DELETE_DEBOUNCE_MS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last edit before an update batch is sent.
    pub update_debounce_ms: Millis,
    /// Quiet period after the last deletion before a delete batch is sent.
    pub delete_debounce_ms: Millis,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_debounce_ms: DEFAULT_DEBOUNCE_MS,
            delete_debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from a key lookup, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let defaults = Self::default();
        Ok(Self {
            update_debounce_ms: parse_ms(&lookup, UPDATE_DEBOUNCE_ENV, defaults.update_debounce_ms)?,
            delete_debounce_ms: parse_ms(&lookup, DELETE_DEBOUNCE_ENV, defaults.delete_debounce_ms)?,
        })
    }
}

fn parse_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Millis,
) -> Result<Millis, EngineError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| EngineError::Config(format!("invalid {key} {raw:?}: {err}"))),
    }
}
