//! Index schemas and dynamic metric mappings
//!
//! The schemas below are the create-time mappings for message and
//! registry indices. Metric fields are not part of the create-time
//! schema; they are pushed incrementally as devices report new metrics
//! (see [`metric_mapping`]).

use serde_json::{json, Map, Value};

use crate::model::MetricKind;
use crate::naming::RegistryKind;

/// Document field holding the device-reported timestamp
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// Document field holding the reporting client id
pub const FIELD_CLIENT_ID: &str = "client_id";
/// Document field holding the slash-joined channel name
pub const FIELD_CHANNEL: &str = "channel";

/// Date format the backend applies to date fields, matching the
/// millisecond-precision UTC wire format of stored timestamps
pub const DATE_MAPPING_FORMAT: &str = "yyyy-MM-dd'T'HH:mm:ss.SSS'Z'";

fn date_field() -> Value {
    json!({ "type": "date", "format": DATE_MAPPING_FORMAT })
}

/// Create-time schema for a time-windowed message index.
///
/// The `metrics` subtree is declared non-dynamic: metric fields enter
/// the mapping only through the explicit incremental pushes of the
/// message store, never through backend type guessing.
pub fn message_index_schema() -> Value {
    json!({
        "properties": {
            "scope_id": { "type": "keyword" },
            "client_id": { "type": "keyword" },
            "device_id": { "type": "keyword" },
            "channel": { "type": "keyword" },
            "channel_parts": { "type": "keyword" },
            "timestamp": date_field(),
            "received_on": date_field(),
            "sent_on": date_field(),
            "captured_on": date_field(),
            "position": {
                "properties": {
                    "latitude": { "type": "double" },
                    "longitude": { "type": "double" },
                    "altitude": { "type": "double" },
                    "precision": { "type": "double" },
                    "heading": { "type": "double" },
                    "speed": { "type": "double" },
                    "timestamp": date_field(),
                    "satellites": { "type": "integer" },
                    "status": { "type": "integer" }
                }
            },
            "metrics": { "type": "object", "dynamic": false },
            "body": { "type": "binary" }
        }
    })
}

/// Create-time schema for a registry index.
pub fn registry_index_schema(kind: RegistryKind) -> Value {
    let mut properties = Map::new();
    properties.insert("scope_id".to_string(), json!({ "type": "keyword" }));
    properties.insert("client_id".to_string(), json!({ "type": "keyword" }));
    match kind {
        RegistryKind::Client => {}
        RegistryKind::Channel => {
            properties.insert("name".to_string(), json!({ "type": "keyword" }));
        }
        RegistryKind::Metric => {
            properties.insert("channel".to_string(), json!({ "type": "keyword" }));
            properties.insert("name".to_string(), json!({ "type": "keyword" }));
            properties.insert("metric_kind".to_string(), json!({ "type": "keyword" }));
        }
    }
    properties.insert("first_message_id".to_string(), json!({ "type": "keyword" }));
    properties.insert("first_message_on".to_string(), date_field());
    json!({ "properties": properties })
}

/// Incremental mapping fragment for a set of metric fields.
///
/// `fields` pairs the normalized metric field path (`{name}.{acronym}`)
/// with its kind. Strings map to keyword fields and dates carry the
/// fixed format; everything else uses its own type name.
pub fn metric_mapping(fields: &[(String, MetricKind)]) -> Value {
    let mut by_name: std::collections::BTreeMap<String, Map<String, Value>> = Default::default();
    for (field, kind) in fields {
        let Some((name, acronym)) = field.rsplit_once('.') else {
            continue;
        };
        let typed = match kind {
            MetricKind::Date => date_field(),
            other => json!({ "type": other.mapping_field_type() }),
        };
        by_name
            .entry(name.to_string())
            .or_default()
            .insert(acronym.to_string(), typed);
    }

    let metric_properties: Map<String, Value> = by_name
        .into_iter()
        .map(|(name, acronyms)| (name, json!({ "properties": acronyms })))
        .collect();
    json!({
        "properties": {
            "metrics": {
                "properties": metric_properties
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_schema_declares_static_metrics_subtree() {
        let schema = message_index_schema();
        assert_eq!(schema["properties"]["metrics"]["dynamic"], json!(false));
        assert_eq!(schema["properties"]["timestamp"]["type"], json!("date"));
    }

    #[test]
    fn test_registry_schemas_differ_by_kind() {
        let client = registry_index_schema(RegistryKind::Client);
        assert!(client["properties"].get("name").is_none());

        let channel = registry_index_schema(RegistryKind::Channel);
        assert_eq!(channel["properties"]["name"]["type"], json!("keyword"));

        let metric = registry_index_schema(RegistryKind::Metric);
        assert_eq!(metric["properties"]["metric_kind"]["type"], json!("keyword"));
    }

    #[test]
    fn test_metric_mapping_types() {
        let mapping = metric_mapping(&[
            ("temperature.dbl".to_string(), MetricKind::Double),
            ("state.str".to_string(), MetricKind::String),
            ("updated.dte".to_string(), MetricKind::Date),
        ]);
        let metrics = &mapping["properties"]["metrics"]["properties"];
        assert_eq!(metrics["temperature"]["properties"]["dbl"]["type"], json!("double"));
        assert_eq!(metrics["state"]["properties"]["str"]["type"], json!("keyword"));
        assert_eq!(metrics["updated"]["properties"]["dte"]["type"], json!("date"));
        assert_eq!(
            metrics["updated"]["properties"]["dte"]["format"],
            json!(DATE_MAPPING_FORMAT)
        );
    }

    #[test]
    fn test_metric_mapping_groups_kinds_under_one_name() {
        let mapping = metric_mapping(&[
            ("temp.dbl".to_string(), MetricKind::Double),
            ("temp.lng".to_string(), MetricKind::Long),
        ]);
        let temp = &mapping["properties"]["metrics"]["properties"]["temp"]["properties"];
        assert!(temp.get("dbl").is_some());
        assert!(temp.get("lng").is_some());
    }
}
