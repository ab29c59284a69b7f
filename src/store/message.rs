//! Message store
//!
//! The append path for telemetry messages:
//!
//! 1. Resolve the time-windowed index from the message timestamp.
//! 2. Synchronize the index mapping: under a per-index lock, diff the
//!    message's metrics against the cached metric set and push only the
//!    fields the index has not seen yet.
//! 3. Insert the message document (outside the critical section).
//! 4. Lazily register the first-seen registry rows the message implies.
//!
//! Mapping pushes are expensive backend calls; once an index's metric
//! set has stabilized, storing a message costs a single insert.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use tracing::debug;

use super::schema::{message_index_schema, metric_mapping};
use crate::cache::MetadataCache;
use crate::client::SearchClient;
use crate::config::DatastoreSettings;
use crate::model::{
    ChannelInfo, ClientInfo, DatastoreMessage, MetricInfo, MetricKind, MetricValue, RegistryRecord,
    Storable, StorableId,
};
use crate::naming::{data_index_name, data_index_name_for, normalize_metric_name};
use crate::query::{FetchStyle, ListResult, StorableQuery};
use crate::repository::StorableRepository;
use crate::{Error, Result};

/// Append-mostly repository for telemetry messages
pub struct MessageStore {
    repo: StorableRepository<DatastoreMessage>,
    settings: Arc<DatastoreSettings>,
    cache: MetadataCache,
    clients: Arc<StorableRepository<ClientInfo>>,
    channels: Arc<StorableRepository<ChannelInfo>>,
    metrics: Arc<StorableRepository<MetricInfo>>,
    /// Registry row ids this process has already created or confirmed
    seen_registry_ids: Arc<DashMap<String, ()>>,
}

impl MessageStore {
    pub(crate) fn new(
        client: Arc<dyn SearchClient>,
        settings: Arc<DatastoreSettings>,
        clients: Arc<StorableRepository<ClientInfo>>,
        channels: Arc<StorableRepository<ChannelInfo>>,
        metrics: Arc<StorableRepository<MetricInfo>>,
        seen_registry_ids: Arc<DashMap<String, ()>>,
    ) -> Self {
        let prefix = settings.index_prefix.clone();
        let repo = StorableRepository::new(
            client,
            settings.clone(),
            Arc::new(move |scope| data_index_name(prefix.as_deref(), scope)),
            Arc::new(message_index_schema),
        );
        Self {
            repo,
            settings,
            cache: MetadataCache::new(),
            clients,
            channels,
            metrics,
            seen_registry_ids,
        }
    }

    fn check_enabled(&self) -> Result<()> {
        if !self.settings.enabled {
            return Err(Error::Disabled);
        }
        Ok(())
    }

    /// Index a message belongs to, given its device timestamp
    pub fn index_for(&self, scope_id: &str, time: Option<DateTime<Utc>>) -> String {
        data_index_name_for(
            self.settings.prefix(),
            scope_id,
            time,
            self.settings.window,
        )
    }

    /// Persist a message and register its first-seen registry rows.
    ///
    /// Returns the storage id the message was inserted under.
    pub async fn store(&self, message: &DatastoreMessage) -> Result<StorableId> {
        self.check_enabled()?;
        if message.scope_id.trim().is_empty() {
            return Err(Error::Validation("message scope id must not be empty".into()));
        }
        if message.client_id.trim().is_empty() {
            return Err(Error::Validation("message client id must not be empty".into()));
        }

        let index = self.index_for(&message.scope_id, message.timestamp);
        self.synchronize_mappings(&index, &message.metrics).await?;

        let id = self.repo.insert(&index, message).await?;
        counter!("thingstore_messages_stored_total").increment(1);
        debug!(index = %index, id = %id, "message stored");

        self.register_origin(message).await?;
        Ok(id)
    }

    /// Mapping synchronization critical section.
    ///
    /// Holds the per-index mutex across "read cache, diff, push mapping,
    /// update cache" and nothing more; the message insert happens outside
    /// so concurrent stores only serialize on genuinely new fields.
    async fn synchronize_mappings(
        &self,
        index: &str,
        metrics: &BTreeMap<String, MetricValue>,
    ) -> Result<()> {
        let lock = self.cache.index_lock(index);
        let _guard = lock.lock().await;

        let fields: Vec<(String, MetricKind)> = metrics
            .iter()
            .map(|(name, value)| (qualified_field(name, value.kind()), value.kind()))
            .collect();

        let diff: Vec<(String, MetricKind)> = match self.cache.known_metrics(index) {
            None => {
                self.repo.ensure_index(index).await?;
                fields
            }
            Some(known) => fields
                .into_iter()
                .filter(|(field, _)| !known.contains_key(field))
                .collect(),
        };

        if !diff.is_empty() {
            let mapping = metric_mapping(&diff);
            self.repo
                .client()
                .put_mapping(index, &mapping)
                .await
                .map_err(|e| Error::Schema(format!("mapping push for {} failed: {}", index, e)))?;
            counter!("thingstore_mapping_pushes_total").increment(1);
            debug!(index = %index, fields = diff.len(), "metric mapping pushed");
        }
        // Record even an empty diff so the index counts as known
        self.cache.record(index, &diff);
        Ok(())
    }

    /// Create the registry rows implied by a message, first occurrence
    /// only. Ids are derived from the tuple, so a row that already exists
    /// is simply confirmed and remembered.
    async fn register_origin(&self, message: &DatastoreMessage) -> Result<()> {
        // First-seen registration needs an instant to record; a message
        // with no usable timestamp cannot anchor one.
        let Some(first_on) = message
            .timestamp
            .or(message.captured_on)
            .or(message.received_on)
        else {
            debug!(client_id = %message.client_id, "message carries no timestamp, skipping registry registration");
            return Ok(());
        };
        let first_id = message.storable_id.clone();

        let client_info = ClientInfo::new(
            &message.scope_id,
            &message.client_id,
            first_id.clone(),
            first_on,
        );
        self.register_row(&*self.clients, client_info).await?;

        let channel_name = message.channel_name();
        if !channel_name.is_empty() {
            let channel_info = ChannelInfo::new(
                &message.scope_id,
                &message.client_id,
                &channel_name,
                first_id.clone(),
                first_on,
            );
            self.register_row(&*self.channels, channel_info).await?;

            for (name, value) in &message.metrics {
                let metric_info = MetricInfo::new(
                    &message.scope_id,
                    &message.client_id,
                    &channel_name,
                    name,
                    value.kind(),
                    first_id.clone(),
                    first_on,
                );
                self.register_row(&*self.metrics, metric_info).await?;
            }
        }
        Ok(())
    }

    async fn register_row<T: RegistryRecord>(
        &self,
        repo: &StorableRepository<T>,
        row: T,
    ) -> Result<()> {
        let id = row.storable_id().clone();
        if self.seen_registry_ids.contains_key(id.as_str()) {
            return Ok(());
        }

        let index = repo.index_for(row.scope_id());
        repo.ensure_index(&index).await?;
        if !repo.exists(&index, &id).await? {
            repo.insert(&index, &row).await?;
            counter!("thingstore_registry_rows_created_total").increment(1);
            debug!(index = %index, id = %id, "registry row created");
        }
        self.seen_registry_ids.insert(id.as_str().to_string(), ());
        Ok(())
    }

    /// Point lookup; the home index is not derivable from the id alone,
    /// so the lookup needs the message time.
    pub async fn find(
        &self,
        scope_id: &str,
        id: &StorableId,
        time: Option<DateTime<Utc>>,
    ) -> Result<Option<DatastoreMessage>> {
        self.check_enabled()?;
        if scope_id.trim().is_empty() {
            return Err(Error::Validation("scope id must not be empty".into()));
        }
        let index = self.index_for(scope_id, time);
        self.repo.find_in_index(&index, id, FetchStyle::Source).await
    }

    /// Predicate query across every time window of the scope.
    pub async fn query(&self, query: &StorableQuery) -> Result<ListResult<DatastoreMessage>> {
        self.check_enabled()?;
        self.repo.query(query).await
    }

    pub async fn count(&self, query: &StorableQuery) -> Result<u64> {
        self.check_enabled()?;
        self.repo.count(query).await
    }

    /// Delete one message by id and time.
    pub async fn delete(
        &self,
        scope_id: &str,
        id: &StorableId,
        time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.check_enabled()?;
        if scope_id.trim().is_empty() {
            return Err(Error::Validation("scope id must not be empty".into()));
        }
        let index = self.index_for(scope_id, time);
        self.repo.delete_in_index(&index, id).await
    }

    pub async fn delete_by_query(&self, query: &StorableQuery) -> Result<u64> {
        self.check_enabled()?;
        self.repo.delete_by_query(query).await
    }

    /// Refresh every message index. The on-disk mapping may differ from
    /// the in-memory view afterwards, so the metadata cache is dropped.
    pub async fn refresh_all_indexes(&self) -> Result<()> {
        self.repo.refresh_all_indexes().await?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub async fn delete_all_indexes(&self) -> Result<()> {
        self.repo.delete_all_indexes().await?;
        self.cache.invalidate_all();
        self.seen_registry_ids.clear();
        Ok(())
    }

    pub async fn delete_indexes(&self, pattern: &str) -> Result<()> {
        self.repo.delete_indexes(pattern).await?;
        self.cache.invalidate_all();
        self.seen_registry_ids.clear();
        Ok(())
    }
}

/// Qualified metric field path: normalized name plus kind acronym
fn qualified_field(name: &str, kind: MetricKind) -> String {
    format!("{}.{}", normalize_metric_name(name), kind.acronym())
}
