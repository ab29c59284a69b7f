//! Storable entity model for the datastore
//!
//! Everything persisted to the search backend is a [`Storable`]: it has a
//! storage id, belongs to a scope, and converts to/from a JSON document.

mod message;
mod metric;
mod registry;

pub use message::{DatastoreMessage, Position};
pub use metric::{convert_to_kind, MetricKind, MetricValue};
pub use registry::{ChannelInfo, ClientInfo, MetricInfo, RegistryRecord};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Timestamp wire format: ISO-8601, millisecond precision, UTC.
///
/// Fixed width keeps formatted timestamps lexicographically sortable,
/// which the backend relies on for range predicates and sorting.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a UTC instant in the datastore wire format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp in the datastore wire format (RFC 3339 accepted as a
/// fallback for offset-bearing producers).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::Convert {
            kind: "date",
            value: raw.to_string(),
        })
}

/// Identifier of a stored document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorableId(String);

impl StorableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random id (used for messages when the producer supplied none)
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StorableId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for StorableId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for StorableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entity the generic repository can persist and load.
pub trait Storable: Clone + Send + Sync + Sized + 'static {
    /// Storage id of this entity
    fn storable_id(&self) -> &StorableId;

    /// Scope the entity belongs to
    fn scope_id(&self) -> &str;

    /// Serialize to the JSON document stored in the backend
    fn to_document(&self) -> Result<serde_json::Value>;

    /// Rebuild the entity from a stored JSON document
    fn from_document(doc: &serde_json::Value) -> Result<Self>;
}

/// Serde adapter for `DateTime<Utc>` fields in the wire format.
pub mod timestamp_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional `DateTime<Utc>` fields in the wire format.
pub mod opt_timestamp_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_some(&format_timestamp(*ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
