//! Registry rows: first-seen metadata derived from the message stream
//!
//! A registry row records the first occurrence of a (scope, client
//! [, channel [, metric]]) tuple. Row ids are derived deterministically
//! from the tuple, so re-registering the same tuple resolves to the same
//! row instead of creating a duplicate. The last-message fields are never
//! persisted; they are filled in at read time by the enrichment query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{timestamp_serde, MetricKind, Storable, StorableId};
use crate::naming::derive_id;
use crate::Result;

/// Common read surface the registry services need from a row.
pub trait RegistryRecord: Storable {
    fn client_id(&self) -> &str;

    /// Channel name for rows that have one (channel and metric rows)
    fn channel(&self) -> Option<&str>;

    fn first_message_id(&self) -> &StorableId;

    fn first_message_on(&self) -> DateTime<Utc>;

    /// Attach the read-time last-published enrichment
    fn set_last_message(&mut self, id: StorableId, on: DateTime<Utc>);
}

/// First occurrence of a (scope, client) tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(skip)]
    pub storable_id: StorableId,
    pub scope_id: String,
    pub client_id: String,
    pub first_message_id: StorableId,
    #[serde(with = "timestamp_serde")]
    pub first_message_on: DateTime<Utc>,
    #[serde(skip)]
    pub last_message_id: Option<StorableId>,
    #[serde(skip)]
    pub last_message_on: Option<DateTime<Utc>>,
}

impl ClientInfo {
    pub fn new(
        scope_id: impl Into<String>,
        client_id: impl Into<String>,
        first_message_id: StorableId,
        first_message_on: DateTime<Utc>,
    ) -> Self {
        let scope_id = scope_id.into();
        let client_id = client_id.into();
        let storable_id = derive_id(&[&scope_id, &client_id]);
        Self {
            storable_id,
            scope_id,
            client_id,
            first_message_id,
            first_message_on,
            last_message_id: None,
            last_message_on: None,
        }
    }
}

/// First occurrence of a (scope, client, channel) tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(skip)]
    pub storable_id: StorableId,
    pub scope_id: String,
    pub client_id: String,
    /// Slash-joined channel name
    pub name: String,
    pub first_message_id: StorableId,
    #[serde(with = "timestamp_serde")]
    pub first_message_on: DateTime<Utc>,
    #[serde(skip)]
    pub last_message_id: Option<StorableId>,
    #[serde(skip)]
    pub last_message_on: Option<DateTime<Utc>>,
}

impl ChannelInfo {
    pub fn new(
        scope_id: impl Into<String>,
        client_id: impl Into<String>,
        name: impl Into<String>,
        first_message_id: StorableId,
        first_message_on: DateTime<Utc>,
    ) -> Self {
        let scope_id = scope_id.into();
        let client_id = client_id.into();
        let name = name.into();
        let storable_id = derive_id(&[&scope_id, &client_id, &name]);
        Self {
            storable_id,
            scope_id,
            client_id,
            name,
            first_message_id,
            first_message_on,
            last_message_id: None,
            last_message_on: None,
        }
    }
}

/// First occurrence of a (scope, client, channel, metric name + kind) tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInfo {
    #[serde(skip)]
    pub storable_id: StorableId,
    pub scope_id: String,
    pub client_id: String,
    /// Slash-joined channel name the metric was first reported on
    pub channel: String,
    /// Metric name as reported by the device (unescaped)
    pub name: String,
    pub metric_kind: MetricKind,
    pub first_message_id: StorableId,
    #[serde(with = "timestamp_serde")]
    pub first_message_on: DateTime<Utc>,
    #[serde(skip)]
    pub last_message_id: Option<StorableId>,
    #[serde(skip)]
    pub last_message_on: Option<DateTime<Utc>>,
}

impl MetricInfo {
    pub fn new(
        scope_id: impl Into<String>,
        client_id: impl Into<String>,
        channel: impl Into<String>,
        name: impl Into<String>,
        metric_kind: MetricKind,
        first_message_id: StorableId,
        first_message_on: DateTime<Utc>,
    ) -> Self {
        let scope_id = scope_id.into();
        let client_id = client_id.into();
        let channel = channel.into();
        let name = name.into();
        let qualified = Self::qualified_name(&name, metric_kind);
        let storable_id = derive_id(&[&scope_id, &client_id, &channel, &qualified]);
        Self {
            storable_id,
            scope_id,
            client_id,
            channel,
            name,
            metric_kind,
            first_message_id,
            first_message_on,
            last_message_id: None,
            last_message_on: None,
        }
    }

    /// Metric name qualified by its kind acronym, the id-derivation form
    pub fn qualified_name(name: &str, kind: MetricKind) -> String {
        format!("{}.{}", name, kind.acronym())
    }
}

macro_rules! registry_storable {
    ($ty:ty) => {
        impl Storable for $ty {
            fn storable_id(&self) -> &StorableId {
                &self.storable_id
            }

            fn scope_id(&self) -> &str {
                &self.scope_id
            }

            fn to_document(&self) -> Result<Value> {
                Ok(serde_json::to_value(self)?)
            }

            fn from_document(doc: &Value) -> Result<Self> {
                let mut record: Self = serde_json::from_value(doc.clone())?;
                if let Some(id) = doc.get("_id").and_then(Value::as_str) {
                    record.storable_id = StorableId::from(id);
                }
                Ok(record)
            }
        }
    };
}

registry_storable!(ClientInfo);
registry_storable!(ChannelInfo);
registry_storable!(MetricInfo);

impl RegistryRecord for ClientInfo {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn channel(&self) -> Option<&str> {
        None
    }

    fn first_message_id(&self) -> &StorableId {
        &self.first_message_id
    }

    fn first_message_on(&self) -> DateTime<Utc> {
        self.first_message_on
    }

    fn set_last_message(&mut self, id: StorableId, on: DateTime<Utc>) {
        self.last_message_id = Some(id);
        self.last_message_on = Some(on);
    }
}

impl RegistryRecord for ChannelInfo {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn channel(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn first_message_id(&self) -> &StorableId {
        &self.first_message_id
    }

    fn first_message_on(&self) -> DateTime<Utc> {
        self.first_message_on
    }

    fn set_last_message(&mut self, id: StorableId, on: DateTime<Utc>) {
        self.last_message_id = Some(id);
        self.last_message_on = Some(on);
    }
}

impl RegistryRecord for MetricInfo {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn channel(&self) -> Option<&str> {
        Some(&self.channel)
    }

    fn first_message_id(&self) -> &StorableId {
        &self.first_message_id
    }

    fn first_message_on(&self) -> DateTime<Utc> {
        self.first_message_on
    }

    fn set_last_message(&mut self, id: StorableId, on: DateTime<Utc>) {
        self.last_message_id = Some(id);
        self.last_message_on = Some(on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn first_on() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_same_tuple_derives_same_id() {
        let a = ChannelInfo::new("s1", "c1", "a/b", StorableId::from("m1"), first_on());
        let b = ChannelInfo::new("s1", "c1", "a/b", StorableId::from("m2"), first_on());
        assert_eq!(a.storable_id, b.storable_id);
    }

    #[test]
    fn test_metric_id_distinguishes_kinds() {
        let dbl = MetricInfo::new(
            "s1",
            "c1",
            "a/b",
            "temp",
            MetricKind::Double,
            StorableId::from("m1"),
            first_on(),
        );
        let lng = MetricInfo::new(
            "s1",
            "c1",
            "a/b",
            "temp",
            MetricKind::Long,
            StorableId::from("m1"),
            first_on(),
        );
        assert_ne!(dbl.storable_id, lng.storable_id);
    }

    #[test]
    fn test_last_message_fields_are_not_persisted() {
        let mut info = ClientInfo::new("s1", "c1", StorableId::from("m1"), first_on());
        info.set_last_message(StorableId::from("m9"), first_on());
        let doc = info.to_document().unwrap();
        assert!(doc.get("last_message_id").is_none());
        assert!(doc.get("last_message_on").is_none());
        assert!(doc.get("first_message_id").is_some());
    }

    #[test]
    fn test_document_round_trip_restores_id_from_backend() {
        let info = MetricInfo::new(
            "s1",
            "c1",
            "a/b",
            "temp",
            MetricKind::Double,
            StorableId::from("m1"),
            first_on(),
        );
        let mut doc = info.to_document().unwrap();
        doc.as_object_mut().unwrap().insert(
            "_id".to_string(),
            serde_json::json!(info.storable_id.as_str()),
        );
        let restored = MetricInfo::from_document(&doc).unwrap();
        assert_eq!(restored, info);
    }
}
