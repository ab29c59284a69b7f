//! Datastore configuration
//!
//! Settings come from the hosting platform's configuration service; the
//! environment-based factory covers standalone deployments and tests.
//!
//! Environment variables:
//! - `THINGSTORE_DISABLED`: disable the datastore feature (default: enabled)
//! - `THINGSTORE_INDEX_PREFIX`: optional prefix for every index name
//! - `THINGSTORE_MAX_RESULT_WINDOW`: pagination ceiling (default: 10000)
//! - `THINGSTORE_INDEX_WINDOW`: `week` (default), `day` or `hour`

use crate::naming::IndexWindow;
use crate::{Error, Result};

/// Default backend result window, matching the search engine's own default
pub const DEFAULT_MAX_RESULT_WINDOW: usize = 10_000;

/// Settings consumed by the datastore core
#[derive(Debug, Clone)]
pub struct DatastoreSettings {
    /// Feature flag; when off every public operation fails with a
    /// disabled-service error before any other validation
    pub enabled: bool,
    /// Optional prefix prepended to every index name
    pub index_prefix: Option<String>,
    /// Upper bound on `limit + offset` for any query
    pub max_result_window: usize,
    /// Rollover granularity of message indices
    pub window: IndexWindow,
}

impl Default for DatastoreSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            index_prefix: None,
            max_result_window: DEFAULT_MAX_RESULT_WINDOW,
            window: IndexWindow::Week,
        }
    }
}

impl DatastoreSettings {
    /// Build settings from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(raw) = std::env::var("THINGSTORE_DISABLED") {
            settings.enabled = !parse_bool("THINGSTORE_DISABLED", &raw)?;
        }
        if let Ok(raw) = std::env::var("THINGSTORE_INDEX_PREFIX") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                settings.index_prefix = Some(trimmed.to_string());
            }
        }
        if let Ok(raw) = std::env::var("THINGSTORE_MAX_RESULT_WINDOW") {
            settings.max_result_window = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "THINGSTORE_MAX_RESULT_WINDOW must be a positive integer, got '{}'",
                    raw
                ))
            })?;
        }
        if let Ok(raw) = std::env::var("THINGSTORE_INDEX_WINDOW") {
            settings.window = raw.parse()?;
        }

        Ok(settings)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.index_prefix.as_deref()
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean (true/false/1/0), got '{}'",
            name, raw
        ))),
    }
}
