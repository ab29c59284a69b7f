//! Predicate, sort and query model for storable queries
//!
//! Predicates are built by the caller and translated by the search client
//! into a backend request. The in-memory client evaluates them directly
//! against stored JSON documents via [`Predicate::matches_document`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value type for predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredicateValue {
    String(String),
    Int64(i64),
    Float64(f64),
    Boolean(bool),
}

impl PredicateValue {
    /// Compare against a document field value.
    ///
    /// Numbers compare numerically across integer/float representations;
    /// strings compare lexicographically (timestamps are fixed-width ISO
    /// strings, so this is time order). Returns `None` when the types are
    /// not comparable.
    fn compare(&self, field: &Value) -> Option<std::cmp::Ordering> {
        match self {
            PredicateValue::String(expected) => {
                field.as_str().map(|actual| actual.cmp(expected.as_str()))
            }
            PredicateValue::Int64(expected) => field
                .as_f64()
                .and_then(|actual| actual.partial_cmp(&(*expected as f64))),
            PredicateValue::Float64(expected) => {
                field.as_f64().and_then(|actual| actual.partial_cmp(expected))
            }
            PredicateValue::Boolean(expected) => {
                field.as_bool().map(|actual| actual.cmp(expected))
            }
        }
    }
}

impl From<&str> for PredicateValue {
    fn from(value: &str) -> Self {
        PredicateValue::String(value.to_string())
    }
}

impl From<String> for PredicateValue {
    fn from(value: String) -> Self {
        PredicateValue::String(value)
    }
}

impl From<i64> for PredicateValue {
    fn from(value: i64) -> Self {
        PredicateValue::Int64(value)
    }
}

impl From<f64> for PredicateValue {
    fn from(value: f64) -> Self {
        PredicateValue::Float64(value)
    }
}

impl From<bool> for PredicateValue {
    fn from(value: bool) -> Self {
        PredicateValue::Boolean(value)
    }
}

/// A predicate over stored document fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Equality: field = value
    Term {
        field: String,
        value: PredicateValue,
    },
    /// Inclusive range: min <= field <= max (either bound optional)
    Range {
        field: String,
        min: Option<PredicateValue>,
        max: Option<PredicateValue>,
    },
    /// Logical AND over sub-predicates
    And(Vec<Predicate>),
    /// Field is present and non-null
    Exists { field: String },
}

impl Predicate {
    pub fn term(field: impl Into<String>, value: impl Into<PredicateValue>) -> Self {
        Predicate::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range(
        field: impl Into<String>,
        min: Option<PredicateValue>,
        max: Option<PredicateValue>,
    ) -> Self {
        Predicate::Range {
            field: field.into(),
            min,
            max,
        }
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Predicate::Exists {
            field: field.into(),
        }
    }

    /// Evaluate against a stored JSON document. A missing field never
    /// matches a term or range.
    pub fn matches_document(&self, doc: &Value) -> bool {
        match self {
            Predicate::Term { field, value } => field_value(doc, field)
                .and_then(|actual| value.compare(actual))
                .map(std::cmp::Ordering::is_eq)
                .unwrap_or(false),
            Predicate::Range { field, min, max } => {
                let Some(actual) = field_value(doc, field) else {
                    return false;
                };
                let above_min = match min {
                    Some(min) => matches!(
                        min.compare(actual),
                        Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                    ),
                    None => true,
                };
                let below_max = match max {
                    Some(max) => matches!(
                        max.compare(actual),
                        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                    ),
                    None => true,
                };
                above_min && below_max
            }
            Predicate::And(predicates) => {
                predicates.iter().all(|p| p.matches_document(doc))
            }
            Predicate::Exists { field } => {
                matches!(field_value(doc, field), Some(v) if !v.is_null())
            }
        }
    }
}

/// Resolve a dot-separated field path inside a document.
///
/// Metric field names are normalized before storage (dots escaped), so
/// splitting on `.` is unambiguous.
pub(crate) fn field_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Sort direction for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A sort criterion on a document field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// How much of each matching document the backend should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchStyle {
    /// The full stored document
    #[default]
    Source,
    /// Indexed fields only (cheaper when aggregates are enough)
    Fields,
    /// Existence only, no document payload
    ExistsOnly,
}

/// A storable query: predicate, sort, pagination and fetch hints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorableQuery {
    pub scope_id: String,
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortField>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Ask the backend for the total match count alongside the page
    pub ask_total_count: bool,
    pub fetch_style: FetchStyle,
}

impl StorableQuery {
    pub fn new(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            predicate: None,
            sort: Vec::new(),
            limit: None,
            offset: 0,
            ask_total_count: false,
            fetch_style: FetchStyle::default(),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn sorted_by(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_total_count(mut self) -> Self {
        self.ask_total_count = true;
        self
    }

    pub fn with_fetch_style(mut self, fetch_style: FetchStyle) -> Self {
        self.fetch_style = fetch_style;
        self
    }
}

/// A page of query results, optionally with the total match count
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total_count: Option<u64>,
}

impl<T> ListResult<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "client_id": "client-1",
            "channel": "a/b",
            "timestamp": "2021-05-04T10:00:00.000Z",
            "metrics": { "temperature": { "dbl": 21.5 } }
        })
    }

    #[test]
    fn test_term_predicate() {
        assert!(Predicate::term("client_id", "client-1").matches_document(&doc()));
        assert!(!Predicate::term("client_id", "client-2").matches_document(&doc()));
        assert!(!Predicate::term("missing", "x").matches_document(&doc()));
    }

    #[test]
    fn test_term_on_nested_metric_field() {
        assert!(Predicate::term("metrics.temperature.dbl", 21.5).matches_document(&doc()));
    }

    #[test]
    fn test_range_predicate_is_inclusive() {
        let pred = Predicate::range(
            "timestamp",
            Some("2021-05-04T10:00:00.000Z".into()),
            None,
        );
        assert!(pred.matches_document(&doc()));

        let pred = Predicate::range(
            "timestamp",
            Some("2021-05-04T10:00:00.001Z".into()),
            None,
        );
        assert!(!pred.matches_document(&doc()));
    }

    #[test]
    fn test_and_predicate() {
        let pred = Predicate::and(vec![
            Predicate::term("client_id", "client-1"),
            Predicate::term("channel", "a/b"),
        ]);
        assert!(pred.matches_document(&doc()));

        let pred = Predicate::and(vec![
            Predicate::term("client_id", "client-1"),
            Predicate::term("channel", "other"),
        ]);
        assert!(!pred.matches_document(&doc()));
    }

    #[test]
    fn test_exists_predicate() {
        assert!(Predicate::exists("metrics.temperature").matches_document(&doc()));
        assert!(!Predicate::exists("metrics.humidity").matches_document(&doc()));
    }

    #[test]
    fn test_numeric_comparison_across_representations() {
        let doc = json!({ "count": 5 });
        assert!(Predicate::term("count", 5.0).matches_document(&doc));
        assert!(Predicate::range("count", Some(4_i64.into()), Some(6_i64.into()))
            .matches_document(&doc));
    }
}
