//! Search client abstraction
//!
//! The datastore never talks to the search engine's wire protocol
//! directly; everything goes through [`SearchClient`]. Production wires
//! in an HTTP-backed implementation, development and tests use
//! [`InMemorySearchClient`].

mod memory;

pub use memory::InMemorySearchClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::StorableId;
use crate::query::{FetchStyle, Predicate, StorableQuery};
use crate::Result;

/// One query hit: document id plus as much of the document as the fetch
/// style requested
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: StorableId,
    pub document: Value,
}

/// A page of query hits with an optional total match count
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    pub hits: Vec<SearchHit>,
    pub total: Option<u64>,
}

/// Backend search-engine client
///
/// Implementations own connection management, timeouts and retries; the
/// datastore core propagates their failures without retrying. All index
/// arguments accepting a pattern support `*` wildcards.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Create an index with the given schema. Creating an index that
    /// already exists is a no-op, not an error.
    async fn create_index(&self, index: &str, schema: &Value) -> Result<()>;

    /// Push a (partial) field mapping into an existing index. Pushing an
    /// already-applied mapping must be idempotent.
    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()>;

    async fn insert(&self, index: &str, id: &StorableId, doc: &Value) -> Result<()>;

    /// Point lookup; `Ok(None)` when the id is not present.
    async fn find(
        &self,
        index: &str,
        id: &StorableId,
        fetch_style: FetchStyle,
    ) -> Result<Option<Value>>;

    async fn query(&self, index_pattern: &str, query: &StorableQuery) -> Result<SearchHits>;

    async fn count(&self, index_pattern: &str, predicate: Option<&Predicate>) -> Result<u64>;

    async fn delete(&self, index: &str, id: &StorableId) -> Result<()>;

    /// Delete every document matching the predicate; returns the number
    /// of deleted documents.
    async fn delete_by_query(&self, index_pattern: &str, predicate: &Predicate) -> Result<u64>;

    async fn refresh_index(&self, index_pattern: &str) -> Result<()>;

    async fn delete_indexes(&self, index_pattern: &str) -> Result<()>;
}
