//! In-memory search client for development and testing
//!
//! Stores documents in per-index ordered maps and evaluates predicates
//! directly against the JSON documents. Mapping pushes are counted so
//! tests can assert the mapping-diff behavior of the message store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{json, Value};

use super::{SearchClient, SearchHit, SearchHits};
use crate::model::StorableId;
use crate::query::{field_value, FetchStyle, Predicate, SortDirection, StorableQuery};
use crate::Result;

use async_trait::async_trait;

#[derive(Debug)]
struct StoredIndex {
    mapping: RwLock<Value>,
    docs: RwLock<BTreeMap<String, Value>>,
}

impl StoredIndex {
    fn new(schema: &Value) -> Self {
        Self {
            mapping: RwLock::new(schema.clone()),
            docs: RwLock::new(BTreeMap::new()),
        }
    }
}

/// In-memory [`SearchClient`] implementation
#[derive(Debug, Default)]
pub struct InMemorySearchClient {
    indices: DashMap<String, Arc<StoredIndex>>,
    mapping_pushes: AtomicU64,
}

impl InMemorySearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put_mapping` calls received so far
    pub fn mapping_push_count(&self) -> u64 {
        self.mapping_pushes.load(Ordering::Relaxed)
    }

    /// Names of currently existing indices (sorted, for assertions)
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Current merged mapping of an index
    pub fn mapping_of(&self, index: &str) -> Option<Value> {
        self.indices.get(index).map(|i| i.mapping.read().clone())
    }

    fn get_or_create(&self, index: &str) -> Arc<StoredIndex> {
        self.indices
            .entry(index.to_string())
            .or_insert_with(|| Arc::new(StoredIndex::new(&json!({}))))
            .clone()
    }

    fn matching_indices(&self, pattern: &str) -> Vec<(String, Arc<StoredIndex>)> {
        let mut matching: Vec<(String, Arc<StoredIndex>)> = self
            .indices
            .iter()
            .filter(|entry| pattern_matches(pattern, entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(&b.0));
        matching
    }

    fn collect_matches(&self, pattern: &str, predicate: Option<&Predicate>) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        for (_, index) in self.matching_indices(pattern) {
            let docs = index.docs.read();
            for (id, doc) in docs.iter() {
                let matches = predicate.map(|p| p.matches_document(doc)).unwrap_or(true);
                if matches {
                    hits.push(SearchHit {
                        id: StorableId::from(id.as_str()),
                        document: doc.clone(),
                    });
                }
            }
        }
        hits
    }
}

/// Match an index name against a `*` wildcard pattern.
fn pattern_matches(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == name;
    }
    let pieces: Vec<&str> = pattern.split('*').collect();
    let mut rest = name;
    for (i, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(piece) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if i == pieces.len() - 1 {
            return rest.ends_with(piece);
        } else {
            match rest.find(piece) {
                Some(pos) => rest = &rest[pos + piece.len()..],
                None => return false,
            }
        }
    }
    // Pattern ends with '*' (or consumed everything)
    pieces.last().map(|p| p.is_empty()).unwrap_or(true) || rest.is_empty()
}

/// Recursively merge an incoming mapping fragment into the stored one.
fn merge_into(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match target.get_mut(key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, incoming) => *target = incoming.clone(),
    }
}

fn compare_fields(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl SearchClient for InMemorySearchClient {
    async fn create_index(&self, index: &str, schema: &Value) -> Result<()> {
        self.indices
            .entry(index.to_string())
            .or_insert_with(|| Arc::new(StoredIndex::new(schema)));
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        self.mapping_pushes.fetch_add(1, Ordering::Relaxed);
        let stored = self.get_or_create(index);
        let mut target = stored.mapping.write();
        merge_into(&mut target, mapping);
        Ok(())
    }

    async fn insert(&self, index: &str, id: &StorableId, doc: &Value) -> Result<()> {
        let stored = self.get_or_create(index);
        stored
            .docs
            .write()
            .insert(id.as_str().to_string(), doc.clone());
        Ok(())
    }

    async fn find(
        &self,
        index: &str,
        id: &StorableId,
        fetch_style: FetchStyle,
    ) -> Result<Option<Value>> {
        let Some(stored) = self.indices.get(index).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let docs = stored.docs.read();
        Ok(docs.get(id.as_str()).map(|doc| match fetch_style {
            FetchStyle::ExistsOnly => json!({}),
            _ => doc.clone(),
        }))
    }

    async fn query(&self, index_pattern: &str, query: &StorableQuery) -> Result<SearchHits> {
        let mut hits = self.collect_matches(index_pattern, query.predicate.as_ref());
        let total = query.ask_total_count.then_some(hits.len() as u64);

        for sort in query.sort.iter().rev() {
            hits.sort_by(|a, b| {
                let empty = Value::Null;
                let a_val = field_value(&a.document, &sort.field).unwrap_or(&empty);
                let b_val = field_value(&b.document, &sort.field).unwrap_or(&empty);
                let ordering = compare_fields(a_val, b_val);
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let hits: Vec<SearchHit> = hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|hit| match query.fetch_style {
                FetchStyle::ExistsOnly => SearchHit {
                    id: hit.id,
                    document: json!({}),
                },
                _ => hit,
            })
            .collect();

        Ok(SearchHits { hits, total })
    }

    async fn count(&self, index_pattern: &str, predicate: Option<&Predicate>) -> Result<u64> {
        Ok(self.collect_matches(index_pattern, predicate).len() as u64)
    }

    async fn delete(&self, index: &str, id: &StorableId) -> Result<()> {
        if let Some(stored) = self.indices.get(index).map(|e| e.value().clone()) {
            stored.docs.write().remove(id.as_str());
        }
        Ok(())
    }

    async fn delete_by_query(&self, index_pattern: &str, predicate: &Predicate) -> Result<u64> {
        let mut deleted = 0;
        for (_, index) in self.matching_indices(index_pattern) {
            let mut docs = index.docs.write();
            let before = docs.len();
            docs.retain(|_, doc| !predicate.matches_document(doc));
            deleted += (before - docs.len()) as u64;
        }
        Ok(deleted)
    }

    async fn refresh_index(&self, _index_pattern: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_indexes(&self, index_pattern: &str) -> Result<()> {
        self.indices
            .retain(|name, _| !pattern_matches(index_pattern, name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortField;

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("s1-data-message-*", "s1-data-message-2021-18"));
        assert!(pattern_matches("*-data-message-*", "s1-data-message-2021-18"));
        assert!(pattern_matches("s1-data-channel", "s1-data-channel"));
        assert!(!pattern_matches("s1-data-message-*", "s2-data-message-2021-18"));
        assert!(!pattern_matches("s1-data-channel", "s1-data-client"));
        assert!(pattern_matches("*", "anything"));
    }

    #[tokio::test]
    async fn test_insert_query_sort_and_paginate() {
        let client = InMemorySearchClient::new();
        for (id, ts) in [
            ("a", "2021-05-04T10:00:00.000Z"),
            ("b", "2021-05-04T11:00:00.000Z"),
            ("c", "2021-05-04T09:00:00.000Z"),
        ] {
            client
                .insert(
                    "s1-data-message-2021-18",
                    &StorableId::from(id),
                    &json!({ "timestamp": ts, "client_id": "c1" }),
                )
                .await
                .unwrap();
        }

        let query = StorableQuery::new("s1")
            .with_predicate(Predicate::term("client_id", "c1"))
            .sorted_by(SortField::descending("timestamp"))
            .with_limit(2)
            .with_total_count();
        let hits = client.query("s1-data-message-*", &query).await.unwrap();

        assert_eq!(hits.total, Some(3));
        assert_eq!(hits.hits.len(), 2);
        assert_eq!(hits.hits[0].id, StorableId::from("b"));
        assert_eq!(hits.hits[1].id, StorableId::from("a"));
    }

    #[tokio::test]
    async fn test_mapping_merge_and_counter() {
        let client = InMemorySearchClient::new();
        client
            .create_index("s1-data-message-2021-18", &json!({ "properties": {} }))
            .await
            .unwrap();

        client
            .put_mapping(
                "s1-data-message-2021-18",
                &json!({ "properties": { "metrics": { "properties": { "a": { "type": "double" } } } } }),
            )
            .await
            .unwrap();
        client
            .put_mapping(
                "s1-data-message-2021-18",
                &json!({ "properties": { "metrics": { "properties": { "b": { "type": "keyword" } } } } }),
            )
            .await
            .unwrap();

        assert_eq!(client.mapping_push_count(), 2);
        let mapping = client.mapping_of("s1-data-message-2021-18").unwrap();
        assert!(mapping["properties"]["metrics"]["properties"]
            .as_object()
            .unwrap()
            .contains_key("a"));
        assert!(mapping["properties"]["metrics"]["properties"]
            .as_object()
            .unwrap()
            .contains_key("b"));
    }

    #[tokio::test]
    async fn test_delete_by_query_and_delete_indexes() {
        let client = InMemorySearchClient::new();
        client
            .insert(
                "s1-data-channel",
                &StorableId::from("x"),
                &json!({ "client_id": "c1" }),
            )
            .await
            .unwrap();
        client
            .insert(
                "s1-data-channel",
                &StorableId::from("y"),
                &json!({ "client_id": "c2" }),
            )
            .await
            .unwrap();

        let deleted = client
            .delete_by_query("s1-data-*", &Predicate::term("client_id", "c1"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(client.count("s1-data-*", None).await.unwrap(), 1);

        client.delete_indexes("s1-data-*").await.unwrap();
        assert!(client.index_names().is_empty());
    }
}
