//! Stored telemetry message
//!
//! A message is append-only: it is inserted once into its time-windowed
//! index and never updated. The document layout is part of the index
//! contract; metric values live under `metrics.{normalizedName}.{acronym}`
//! so the same metric name can be stored with several types over time.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{
    format_timestamp, opt_timestamp_serde, MetricKind, MetricValue, Storable, StorableId,
};
use crate::naming::{normalize_metric_name, restore_metric_name};
use crate::{Error, Result};

/// Geolocation attached to a message by the reporting device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(
        default,
        with = "opt_timestamp_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellites: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

/// One device telemetry message as stored in a time-windowed index
#[derive(Debug, Clone, PartialEq)]
pub struct DatastoreMessage {
    /// Storage id; generated at construction, overridable by the producer
    pub storable_id: StorableId,
    pub scope_id: String,
    pub client_id: String,
    pub device_id: Option<String>,
    /// Ordered semantic path segments of the channel
    pub channel: Vec<String>,
    /// Device-reported timestamp; decides the home index window
    pub timestamp: Option<DateTime<Utc>>,
    pub received_on: Option<DateTime<Utc>>,
    pub sent_on: Option<DateTime<Utc>>,
    pub captured_on: Option<DateTime<Utc>>,
    pub position: Option<Position>,
    pub metrics: BTreeMap<String, MetricValue>,
    pub body: Option<Vec<u8>>,
}

impl DatastoreMessage {
    pub fn new(scope_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            storable_id: StorableId::random(),
            scope_id: scope_id.into(),
            client_id: client_id.into(),
            device_id: None,
            channel: Vec::new(),
            timestamp: None,
            received_on: None,
            sent_on: None,
            captured_on: None,
            position: None,
            metrics: BTreeMap::new(),
            body: None,
        }
    }

    /// Channel as a single slash-joined name (the form registry rows use)
    pub fn channel_name(&self) -> String {
        self.channel.join("/")
    }
}

fn put_opt_timestamp(doc: &mut Map<String, Value>, field: &str, ts: Option<DateTime<Utc>>) {
    if let Some(ts) = ts {
        doc.insert(field.to_string(), Value::String(format_timestamp(ts)));
    }
}

fn get_str(doc: &Value, field: &str) -> Result<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Serialization(format!("message document missing '{}'", field)))
}

fn get_opt_timestamp(doc: &Value, field: &str) -> Result<Option<DateTime<Utc>>> {
    match doc.get(field).and_then(Value::as_str) {
        Some(raw) => super::parse_timestamp(raw).map(Some),
        None => Ok(None),
    }
}

impl Storable for DatastoreMessage {
    fn storable_id(&self) -> &StorableId {
        &self.storable_id
    }

    fn scope_id(&self) -> &str {
        &self.scope_id
    }

    fn to_document(&self) -> Result<Value> {
        let mut doc = Map::new();
        doc.insert("scope_id".to_string(), json!(self.scope_id));
        doc.insert("client_id".to_string(), json!(self.client_id));
        if let Some(device_id) = &self.device_id {
            doc.insert("device_id".to_string(), json!(device_id));
        }
        doc.insert("channel".to_string(), json!(self.channel_name()));
        doc.insert("channel_parts".to_string(), json!(self.channel));
        put_opt_timestamp(&mut doc, "timestamp", self.timestamp);
        put_opt_timestamp(&mut doc, "received_on", self.received_on);
        put_opt_timestamp(&mut doc, "sent_on", self.sent_on);
        put_opt_timestamp(&mut doc, "captured_on", self.captured_on);
        if let Some(position) = &self.position {
            doc.insert("position".to_string(), serde_json::to_value(position)?);
        }

        let mut metrics = Map::new();
        for (name, value) in &self.metrics {
            let mut typed = Map::new();
            typed.insert(value.kind().acronym().to_string(), value.to_json());
            metrics.insert(normalize_metric_name(name), Value::Object(typed));
        }
        doc.insert("metrics".to_string(), Value::Object(metrics));

        if let Some(body) = &self.body {
            doc.insert("body".to_string(), Value::String(BASE64.encode(body)));
        }
        Ok(Value::Object(doc))
    }

    fn from_document(doc: &Value) -> Result<Self> {
        let channel = doc
            .get("channel_parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut metrics = BTreeMap::new();
        if let Some(stored) = doc.get("metrics").and_then(Value::as_object) {
            for (normalized, typed) in stored {
                let Some(typed) = typed.as_object() else {
                    continue;
                };
                let name = restore_metric_name(normalized);
                for (acronym, raw) in typed {
                    let kind = MetricKind::from_acronym(acronym)?;
                    metrics.insert(name.clone(), MetricValue::from_json(kind, raw)?);
                }
            }
        }

        let body = match doc.get("body").and_then(Value::as_str) {
            Some(raw) => Some(
                BASE64
                    .decode(raw)
                    .map_err(|e| Error::Serialization(format!("invalid message body: {}", e)))?,
            ),
            None => None,
        };

        let position = match doc.get("position") {
            Some(raw) => Some(serde_json::from_value(raw.clone())?),
            None => None,
        };

        Ok(Self {
            storable_id: doc
                .get("_id")
                .and_then(Value::as_str)
                .map(StorableId::from)
                .unwrap_or_else(StorableId::random),
            scope_id: get_str(doc, "scope_id")?,
            client_id: get_str(doc, "client_id")?,
            device_id: doc
                .get("device_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            channel,
            timestamp: get_opt_timestamp(doc, "timestamp")?,
            received_on: get_opt_timestamp(doc, "received_on")?,
            sent_on: get_opt_timestamp(doc, "sent_on")?,
            captured_on: get_opt_timestamp(doc, "captured_on")?,
            position,
            metrics,
            body,
        })
    }
}
