//! Index naming and identifier derivation
//!
//! Index names are a wire contract shared with retention tooling and must
//! stay bit-exact:
//!
//! - registry index:  `[{prefix}-]{scope|*}-data-{channel|client|metric}`
//! - message index:   `[{prefix}-]{scope|*}-data-message-*` (admin form)
//! - message index:   `[{prefix}-]{scope}-data-message-{windowToken}` (write form)
//!
//! The window token is derived from the message's UTC timestamp and is
//! lexicographically sortable within a window option.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::model::StorableId;
use crate::{Error, Result};

/// Window token used for messages that carry no device timestamp
pub const NO_TIME_TOKEN: &str = "no-time";

/// Rollover granularity of time-partitioned message indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexWindow {
    /// One index per ISO week (default)
    #[default]
    Week,
    /// One index per calendar day
    Day,
    /// One index per hour
    Hour,
}

impl IndexWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexWindow::Week => "week",
            IndexWindow::Day => "day",
            IndexWindow::Hour => "hour",
        }
    }

    /// Format the window token for a UTC instant.
    ///
    /// Week tokens use the ISO week-based year (`%G-%V`) so the token
    /// around new year belongs to the week's year, not the calendar year.
    pub fn token(&self, ts: DateTime<Utc>) -> String {
        match self {
            IndexWindow::Week => ts.format("%G-%V").to_string(),
            IndexWindow::Day => ts.format("%Y-%m-%d").to_string(),
            IndexWindow::Hour => ts.format("%Y-%m-%d-%H").to_string(),
        }
    }
}

impl std::str::FromStr for IndexWindow {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(IndexWindow::Week),
            "day" => Ok(IndexWindow::Day),
            "hour" => Ok(IndexWindow::Hour),
            other => Err(Error::Config(format!(
                "unknown index window '{}'; expected one of week, day, hour",
                other
            ))),
        }
    }
}

/// Kind discriminator for registry indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Channel,
    Client,
    Metric,
}

impl RegistryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryKind::Channel => "channel",
            RegistryKind::Client => "client",
            RegistryKind::Metric => "metric",
        }
    }
}

fn prefixed(prefix: Option<&str>, rest: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}-{}", p, rest),
        _ => rest.to_string(),
    }
}

/// Wildcard message-index name covering every time window of a scope.
///
/// Used for cross-window operations (query, refresh, bulk delete).
pub fn data_index_name(prefix: Option<&str>, scope_id: &str) -> String {
    prefixed(prefix, &format!("{}-data-message-*", scope_id))
}

/// Write-time message-index name for a concrete timestamp.
///
/// Messages without a device timestamp land in the sentinel
/// [`NO_TIME_TOKEN`] bucket.
pub fn data_index_name_for(
    prefix: Option<&str>,
    scope_id: &str,
    ts: Option<DateTime<Utc>>,
    window: IndexWindow,
) -> String {
    let token = match ts {
        Some(ts) => window.token(ts),
        None => NO_TIME_TOKEN.to_string(),
    };
    prefixed(prefix, &format!("{}-data-message-{}", scope_id, token))
}

/// Registry-index name for a scope and registry kind.
pub fn registry_index_name(prefix: Option<&str>, scope_id: &str, kind: RegistryKind) -> String {
    prefixed(prefix, &format!("{}-data-{}", scope_id, kind.as_str()))
}

/// Escape `$` and `.` in a metric name for use as a search field name.
///
/// `$` becomes `$24` and `.` becomes `$2e`; escaping `$` first makes the
/// mapping reversible for any input.
pub fn normalize_metric_name(name: &str) -> String {
    name.replace('$', "$24").replace('.', "$2e")
}

/// Inverse of [`normalize_metric_name`].
pub fn restore_metric_name(name: &str) -> String {
    name.replace("$2e", ".").replace("$24", "$")
}

/// Derive a deterministic storable id from an ordered tuple of parts.
///
/// Same inputs always produce the same id; this is what makes registry
/// registration idempotent. The digest covers the `|`-joined parts, so
/// the id is stable across releases.
pub fn derive_id(parts: &[&str]) -> StorableId {
    let joined = parts.join("|");
    let digest = Sha256::digest(joined.as_bytes());
    StorableId::from(URL_SAFE_NO_PAD.encode(digest))
}
