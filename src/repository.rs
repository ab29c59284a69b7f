//! Generic storable repository
//!
//! Shared index-lifecycle and CRUD/query machinery for every storable
//! entity. Instead of an inheritance chain, the repository is composed
//! from injected pieces: the entity's [`Storable`] impl, an index
//! resolver (scope -> index name) and a lazily-evaluated index schema.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::client::SearchClient;
use crate::config::DatastoreSettings;
use crate::model::{Storable, StorableId};
use crate::query::{FetchStyle, ListResult, StorableQuery};
use crate::{Error, Result};

/// Maps a scope id (or `*`) to the index name/pattern of an entity class
pub type IndexResolver = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Produces the JSON schema used when creating an index
pub type SchemaProvider = Arc<dyn Fn() -> Value + Send + Sync>;

/// Generic repository over a storable entity type
pub struct StorableRepository<T: Storable> {
    client: Arc<dyn SearchClient>,
    settings: Arc<DatastoreSettings>,
    index_resolver: IndexResolver,
    schema_provider: SchemaProvider,
    schema: OnceLock<Value>,
    /// Indices already created (or confirmed) by this process
    known_indices: DashMap<String, ()>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Storable> StorableRepository<T> {
    pub fn new(
        client: Arc<dyn SearchClient>,
        settings: Arc<DatastoreSettings>,
        index_resolver: IndexResolver,
        schema_provider: SchemaProvider,
    ) -> Self {
        Self {
            client,
            settings,
            index_resolver,
            schema_provider,
            schema: OnceLock::new(),
            known_indices: DashMap::new(),
            _entity: PhantomData,
        }
    }

    pub fn settings(&self) -> &DatastoreSettings {
        &self.settings
    }

    pub fn client(&self) -> &Arc<dyn SearchClient> {
        &self.client
    }

    /// Index name (or wildcard pattern) for a scope
    pub fn index_for(&self, scope_id: &str) -> String {
        (self.index_resolver)(scope_id)
    }

    fn schema(&self) -> &Value {
        self.schema.get_or_init(|| (self.schema_provider)())
    }

    /// Enforce the pagination ceiling before any backend call.
    pub fn check_result_window(&self, limit: Option<usize>, offset: usize) -> Result<()> {
        let reach = limit.unwrap_or(0).saturating_add(offset);
        if reach > self.settings.max_result_window {
            return Err(Error::Validation(format!(
                "limit + offset ({}) exceeds the maximum result window ({})",
                reach, self.settings.max_result_window
            )));
        }
        Ok(())
    }

    /// Idempotently create the index with the entity schema.
    ///
    /// Concurrent callers may both reach the backend; the backend's
    /// create-if-absent semantics make that harmless.
    pub async fn ensure_index(&self, index: &str) -> Result<()> {
        if self.known_indices.contains_key(index) {
            return Ok(());
        }
        self.client.create_index(index, self.schema()).await?;
        debug!(index, "index ensured");
        self.known_indices.insert(index.to_string(), ());
        Ok(())
    }

    /// Insert an entity into a concrete index under its storable id.
    pub async fn insert(&self, index: &str, entity: &T) -> Result<StorableId> {
        self.ensure_index(index).await?;
        let doc = entity.to_document()?;
        self.client.insert(index, entity.storable_id(), &doc).await?;
        Ok(entity.storable_id().clone())
    }

    /// Point lookup by scope and id; `Ok(None)` when nothing matches.
    pub async fn find(&self, scope_id: &str, id: &StorableId) -> Result<Option<T>> {
        self.find_with_fetch_style(scope_id, id, FetchStyle::Source)
            .await
    }

    pub async fn find_with_fetch_style(
        &self,
        scope_id: &str,
        id: &StorableId,
        fetch_style: FetchStyle,
    ) -> Result<Option<T>> {
        require_non_empty(scope_id, "scope id")?;
        let index = self.index_for(scope_id);
        self.find_in_index(&index, id, fetch_style).await
    }

    /// Point lookup in an explicitly resolved index (message lookups,
    /// whose home index depends on the timestamp).
    pub async fn find_in_index(
        &self,
        index: &str,
        id: &StorableId,
        fetch_style: FetchStyle,
    ) -> Result<Option<T>> {
        require_non_empty(id.as_str(), "storable id")?;
        match self.client.find(index, id, fetch_style).await? {
            Some(doc) => Ok(Some(T::from_document(&with_id(doc, id))?)),
            None => Ok(None),
        }
    }

    /// Existence check without fetching the document.
    pub async fn exists(&self, index: &str, id: &StorableId) -> Result<bool> {
        require_non_empty(id.as_str(), "storable id")?;
        Ok(self
            .client
            .find(index, id, FetchStyle::ExistsOnly)
            .await?
            .is_some())
    }

    /// Predicate query across the entity's indices for the query's scope.
    pub async fn query(&self, query: &StorableQuery) -> Result<ListResult<T>> {
        require_non_empty(&query.scope_id, "scope id")?;
        self.check_result_window(query.limit, query.offset)?;

        let pattern = self.index_for(&query.scope_id);
        let hits = self.client.query(&pattern, query).await?;

        let mut items = Vec::with_capacity(hits.hits.len());
        for hit in hits.hits {
            let id = hit.id;
            items.push(T::from_document(&with_id(hit.document, &id))?);
        }
        Ok(ListResult {
            items,
            total_count: hits.total,
        })
    }

    /// Count-only form of [`StorableRepository::query`].
    pub async fn count(&self, query: &StorableQuery) -> Result<u64> {
        require_non_empty(&query.scope_id, "scope id")?;
        let pattern = self.index_for(&query.scope_id);
        self.client
            .count(&pattern, query.predicate.as_ref())
            .await
    }

    pub async fn delete(&self, scope_id: &str, id: &StorableId) -> Result<()> {
        require_non_empty(scope_id, "scope id")?;
        let index = self.index_for(scope_id);
        self.delete_in_index(&index, id).await
    }

    pub async fn delete_in_index(&self, index: &str, id: &StorableId) -> Result<()> {
        require_non_empty(id.as_str(), "storable id")?;
        self.client.delete(index, id).await
    }

    /// Delete every document matching the query's predicate.
    pub async fn delete_by_query(&self, query: &StorableQuery) -> Result<u64> {
        require_non_empty(&query.scope_id, "scope id")?;
        let predicate = query
            .predicate
            .as_ref()
            .ok_or_else(|| Error::Validation("delete-by-query requires a predicate".into()))?;
        let pattern = self.index_for(&query.scope_id);
        self.client.delete_by_query(&pattern, predicate).await
    }

    /// Refresh every index of this entity class across all scopes.
    pub async fn refresh_all_indexes(&self) -> Result<()> {
        self.client.refresh_index(&self.index_for("*")).await
    }

    /// Delete every index of this entity class across all scopes.
    pub async fn delete_all_indexes(&self) -> Result<()> {
        self.client.delete_indexes(&self.index_for("*")).await?;
        self.known_indices.clear();
        Ok(())
    }

    /// Delete indices matching an explicit pattern.
    pub async fn delete_indexes(&self, pattern: &str) -> Result<()> {
        self.client.delete_indexes(pattern).await?;
        self.known_indices.clear();
        Ok(())
    }
}

fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

/// Attach the backend id to a fetched document so `from_document` sees it.
fn with_id(mut doc: Value, id: &StorableId) -> Value {
    if let Some(map) = doc.as_object_mut() {
        map.insert("_id".to_string(), Value::String(id.as_str().to_string()));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemorySearchClient;
    use crate::model::ClientInfo;
    use crate::naming::{registry_index_name, RegistryKind};
    use chrono::TimeZone;
    use serde_json::json;

    fn repository(
        client: Arc<InMemorySearchClient>,
        settings: DatastoreSettings,
    ) -> StorableRepository<ClientInfo> {
        let prefix = settings.index_prefix.clone();
        StorableRepository::new(
            client,
            Arc::new(settings),
            Arc::new(move |scope| {
                registry_index_name(prefix.as_deref(), scope, RegistryKind::Client)
            }),
            Arc::new(|| json!({ "properties": {} })),
        )
    }

    fn sample_info() -> ClientInfo {
        ClientInfo::new(
            "s1",
            "c1",
            StorableId::from("m1"),
            chrono::Utc.with_ymd_and_hms(2021, 5, 4, 10, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let client = Arc::new(InMemorySearchClient::new());
        let repo = repository(client.clone(), DatastoreSettings::default());
        let info = sample_info();

        let index = repo.index_for("s1");
        repo.insert(&index, &info).await.unwrap();

        let found = repo.find("s1", &info.storable_id).await.unwrap().unwrap();
        assert_eq!(found, info);
        assert_eq!(client.index_names(), vec!["s1-data-client".to_string()]);
    }

    #[tokio::test]
    async fn test_find_miss_is_none_not_error() {
        let client = Arc::new(InMemorySearchClient::new());
        let repo = repository(client, DatastoreSettings::default());
        let found = repo.find("s1", &StorableId::from("nope")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_result_window_is_enforced_before_io() {
        let client = Arc::new(InMemorySearchClient::new());
        let repo = repository(client, DatastoreSettings::default());

        let over = StorableQuery::new("s1").with_limit(50).with_offset(9_999_999);
        assert!(matches!(
            repo.query(&over).await,
            Err(Error::Validation(_))
        ));

        let within = StorableQuery::new("s1").with_limit(50).with_offset(100);
        assert!(repo.query(&within).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_scope_is_rejected() {
        let client = Arc::new(InMemorySearchClient::new());
        let repo = repository(client, DatastoreSettings::default());
        assert!(matches!(
            repo.find("  ", &StorableId::from("x")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_by_query_requires_predicate() {
        let client = Arc::new(InMemorySearchClient::new());
        let repo = repository(client, DatastoreSettings::default());
        assert!(matches!(
            repo.delete_by_query(&StorableQuery::new("s1")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_all_indexes_forgets_known_indices() {
        let client = Arc::new(InMemorySearchClient::new());
        let repo = repository(client.clone(), DatastoreSettings::default());
        let info = sample_info();

        repo.insert(&repo.index_for("s1"), &info).await.unwrap();
        repo.delete_all_indexes().await.unwrap();
        assert!(client.index_names().is_empty());

        // Re-inserting after teardown recreates the index
        repo.insert(&repo.index_for("s1"), &info).await.unwrap();
        assert_eq!(client.index_names(), vec!["s1-data-client".to_string()]);
    }
}
