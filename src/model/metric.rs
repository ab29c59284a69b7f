//! Metric value taxonomy
//!
//! Devices report loosely-typed metric values; the index schema is
//! strongly typed. [`MetricKind`] is the closed set of eight canonical
//! types, each with a fixed three-letter acronym used as the index
//! field-name suffix so the same metric name can carry different types
//! over time without a field collision.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::{format_timestamp, parse_timestamp};
use crate::{Error, Result};

/// The eight canonical metric types.
///
/// The acronym table is a wire contract with already-stored data and
/// must match exactly: `str,int,lng,flt,dbl,dte,bln,bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    String,
    Integer,
    Long,
    Float,
    Double,
    Date,
    Boolean,
    Binary,
}

impl MetricKind {
    /// Canonical type name as reported by clients
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::String => "string",
            MetricKind::Integer => "integer",
            MetricKind::Long => "long",
            MetricKind::Float => "float",
            MetricKind::Double => "double",
            MetricKind::Date => "date",
            MetricKind::Boolean => "boolean",
            MetricKind::Binary => "binary",
        }
    }

    /// Three-letter acronym used as the index field-name suffix
    pub fn acronym(&self) -> &'static str {
        match self {
            MetricKind::String => "str",
            MetricKind::Integer => "int",
            MetricKind::Long => "lng",
            MetricKind::Float => "flt",
            MetricKind::Double => "dbl",
            MetricKind::Date => "dte",
            MetricKind::Boolean => "bln",
            MetricKind::Binary => "bin",
        }
    }

    pub fn from_acronym(acronym: &str) -> Result<Self> {
        match acronym {
            "str" => Ok(MetricKind::String),
            "int" => Ok(MetricKind::Integer),
            "lng" => Ok(MetricKind::Long),
            "flt" => Ok(MetricKind::Float),
            "dbl" => Ok(MetricKind::Double),
            "dte" => Ok(MetricKind::Date),
            "bln" => Ok(MetricKind::Boolean),
            "bin" => Ok(MetricKind::Binary),
            other => Err(Error::Validation(format!(
                "unknown metric type acronym '{}'",
                other
            ))),
        }
    }

    pub fn from_type_name(name: &str) -> Result<Self> {
        match name {
            "string" => Ok(MetricKind::String),
            "integer" => Ok(MetricKind::Integer),
            "long" => Ok(MetricKind::Long),
            "float" => Ok(MetricKind::Float),
            "double" => Ok(MetricKind::Double),
            "date" => Ok(MetricKind::Date),
            "boolean" => Ok(MetricKind::Boolean),
            "binary" => Ok(MetricKind::Binary),
            other => Err(Error::Validation(format!(
                "unknown metric type '{}'",
                other
            ))),
        }
    }

    /// Index field type for this kind.
    ///
    /// Strings map to non-analyzed keyword fields and dates carry the
    /// fixed wire format; every other kind uses its own type name.
    pub fn mapping_field_type(&self) -> &'static str {
        match self {
            MetricKind::String => "keyword",
            other => other.as_str(),
        }
    }
}

impl Serialize for MetricKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.acronym())
    }
}

impl<'de> Deserialize<'de> for MetricKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MetricKind::from_acronym(&raw).map_err(serde::de::Error::custom)
    }
}

/// A typed metric value
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Str(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Date(DateTime<Utc>),
    Bool(bool),
    Binary(Vec<u8>),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Str(_) => MetricKind::String,
            MetricValue::Int(_) => MetricKind::Integer,
            MetricValue::Long(_) => MetricKind::Long,
            MetricValue::Float(_) => MetricKind::Float,
            MetricValue::Double(_) => MetricKind::Double,
            MetricValue::Date(_) => MetricKind::Date,
            MetricValue::Bool(_) => MetricKind::Boolean,
            MetricValue::Binary(_) => MetricKind::Binary,
        }
    }

    /// Serialize the value as it is stored inside a message document
    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Str(v) => Value::String(v.clone()),
            MetricValue::Int(v) => Value::from(*v),
            MetricValue::Long(v) => Value::from(*v),
            MetricValue::Float(v) => Value::from(*v),
            MetricValue::Double(v) => Value::from(*v),
            MetricValue::Date(v) => Value::String(format_timestamp(*v)),
            MetricValue::Bool(v) => Value::Bool(*v),
            MetricValue::Binary(v) => Value::String(BASE64.encode(v)),
        }
    }

    /// Rebuild a value of a known kind from its stored representation
    pub fn from_json(kind: MetricKind, raw: &Value) -> Result<Self> {
        convert_to_kind(kind, raw)
    }
}

fn convert_error(kind: MetricKind, raw: &Value) -> Error {
    Error::Convert {
        kind: kind.as_str(),
        value: raw.to_string(),
    }
}

/// Convert a loosely-typed incoming value to the canonical type for a kind.
///
/// Numbers and numeric strings convert for the numeric kinds; strings and
/// millisecond numbers convert for dates. Parse failures surface as a
/// typed conversion error. The remaining kinds accept only their native
/// representation.
pub fn convert_to_kind(kind: MetricKind, raw: &Value) -> Result<MetricValue> {
    match kind {
        MetricKind::Double => match raw {
            Value::Number(n) => n
                .as_f64()
                .map(MetricValue::Double)
                .ok_or_else(|| convert_error(kind, raw)),
            Value::String(s) => s
                .parse::<f64>()
                .map(MetricValue::Double)
                .map_err(|_| convert_error(kind, raw)),
            _ => Err(convert_error(kind, raw)),
        },
        MetricKind::Float => match raw {
            Value::Number(n) => n
                .as_f64()
                .map(|v| MetricValue::Float(v as f32))
                .ok_or_else(|| convert_error(kind, raw)),
            Value::String(s) => s
                .parse::<f32>()
                .map(MetricValue::Float)
                .map_err(|_| convert_error(kind, raw)),
            _ => Err(convert_error(kind, raw)),
        },
        MetricKind::Integer => match raw {
            Value::Number(n) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(MetricValue::Int)
                .ok_or_else(|| convert_error(kind, raw)),
            Value::String(s) => s
                .parse::<i32>()
                .map(MetricValue::Int)
                .map_err(|_| convert_error(kind, raw)),
            _ => Err(convert_error(kind, raw)),
        },
        MetricKind::Long => match raw {
            Value::Number(n) => n
                .as_i64()
                .map(MetricValue::Long)
                .ok_or_else(|| convert_error(kind, raw)),
            Value::String(s) => s
                .parse::<i64>()
                .map(MetricValue::Long)
                .map_err(|_| convert_error(kind, raw)),
            _ => Err(convert_error(kind, raw)),
        },
        MetricKind::Date => match raw {
            Value::String(s) => parse_timestamp(s).map(MetricValue::Date),
            Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(MetricValue::Date)
                .ok_or_else(|| convert_error(kind, raw)),
            _ => Err(convert_error(kind, raw)),
        },
        MetricKind::String => match raw {
            Value::String(s) => Ok(MetricValue::Str(s.clone())),
            _ => Err(convert_error(kind, raw)),
        },
        MetricKind::Boolean => match raw {
            Value::Bool(b) => Ok(MetricValue::Bool(*b)),
            _ => Err(convert_error(kind, raw)),
        },
        MetricKind::Binary => match raw {
            Value::String(s) => BASE64
                .decode(s)
                .map(MetricValue::Binary)
                .map_err(|_| convert_error(kind, raw)),
            _ => Err(convert_error(kind, raw)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL_KINDS: [MetricKind; 8] = [
        MetricKind::String,
        MetricKind::Integer,
        MetricKind::Long,
        MetricKind::Float,
        MetricKind::Double,
        MetricKind::Date,
        MetricKind::Boolean,
        MetricKind::Binary,
    ];

    #[test]
    fn test_acronym_round_trip() {
        for kind in ALL_KINDS {
            assert_eq!(MetricKind::from_acronym(kind.acronym()).unwrap(), kind);
            assert_eq!(MetricKind::from_type_name(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_acronym_is_an_error() {
        assert!(MetricKind::from_acronym("xyz").is_err());
        assert!(MetricKind::from_type_name("decimal").is_err());
    }

    #[test]
    fn test_numeric_conversion_from_string_and_number() {
        assert_eq!(
            convert_to_kind(MetricKind::Double, &json!("1.5")).unwrap(),
            MetricValue::Double(1.5)
        );
        assert_eq!(
            convert_to_kind(MetricKind::Double, &json!(2.5)).unwrap(),
            MetricValue::Double(2.5)
        );
        assert_eq!(
            convert_to_kind(MetricKind::Integer, &json!("42")).unwrap(),
            MetricValue::Int(42)
        );
        assert_eq!(
            convert_to_kind(MetricKind::Long, &json!(7_000_000_000_i64)).unwrap(),
            MetricValue::Long(7_000_000_000)
        );
        assert_eq!(
            convert_to_kind(MetricKind::Float, &json!("0.25")).unwrap(),
            MetricValue::Float(0.25)
        );
    }

    #[test]
    fn test_unparseable_values_raise_conversion_errors() {
        assert!(matches!(
            convert_to_kind(MetricKind::Double, &json!("not-a-number")),
            Err(Error::Convert { kind: "double", .. })
        ));
        assert!(matches!(
            convert_to_kind(MetricKind::Date, &json!("yesterday")),
            Err(Error::Convert { kind: "date", .. })
        ));
        assert!(convert_to_kind(MetricKind::Integer, &json!(1e12)).is_err());
    }

    #[test]
    fn test_date_conversion_from_millis_and_string() {
        let millis = convert_to_kind(MetricKind::Date, &json!(1_485_256_930_999_i64)).unwrap();
        let string =
            convert_to_kind(MetricKind::Date, &json!("2017-01-24T11:22:10.999Z")).unwrap();
        assert_eq!(millis, string);
    }

    #[test]
    fn test_value_json_round_trip() {
        let values = vec![
            MetricValue::Str("on".to_string()),
            MetricValue::Int(-3),
            MetricValue::Long(1 << 40),
            MetricValue::Double(9.75),
            MetricValue::Bool(true),
            MetricValue::Binary(vec![0xde, 0xad, 0xbe, 0xef]),
        ];
        for value in values {
            let json = value.to_json();
            assert_eq!(MetricValue::from_json(value.kind(), &json).unwrap(), value);
        }
    }
}
