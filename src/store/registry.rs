//! Registry services
//!
//! Public read/delete surface over the first-seen registries. Every
//! operation is gated on the datastore feature flag and a permission
//! check, and reads can be enriched with the id/timestamp of the most
//! recent matching message ("last published").
//!
//! Enrichment is a non-critical read-side derivation: when it cannot be
//! computed the row is still returned, with the derived fields left
//! unset. Missing messages are the expected steady state under message
//! retention and are only worth a warning.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, warn};

use super::message::MessageStore;
use super::schema::{FIELD_CHANNEL, FIELD_CLIENT_ID, FIELD_TIMESTAMP};
use crate::auth::{Action, Authorizer, Domain};
use crate::config::DatastoreSettings;
use crate::model::{
    format_timestamp, ChannelInfo, ClientInfo, MetricInfo, RegistryRecord, Storable, StorableId,
};
use crate::naming::RegistryKind;
use crate::query::{ListResult, Predicate, SortField, StorableQuery};
use crate::repository::StorableRepository;
use crate::{Error, Result};

/// Registry service over one registry entity class
pub struct RegistryStore<T: RegistryRecord> {
    repo: Arc<StorableRepository<T>>,
    messages: Arc<MessageStore>,
    authorizer: Arc<dyn Authorizer>,
    settings: Arc<DatastoreSettings>,
    seen_registry_ids: Arc<DashMap<String, ()>>,
    kind: RegistryKind,
}

/// Registry service for first-seen clients
pub type ClientInfoStore = RegistryStore<ClientInfo>;
/// Registry service for first-seen channels
pub type ChannelInfoStore = RegistryStore<ChannelInfo>;
/// Registry service for first-seen metrics
pub type MetricInfoStore = RegistryStore<MetricInfo>;

impl<T: RegistryRecord> RegistryStore<T> {
    pub(crate) fn new(
        repo: Arc<StorableRepository<T>>,
        messages: Arc<MessageStore>,
        authorizer: Arc<dyn Authorizer>,
        settings: Arc<DatastoreSettings>,
        seen_registry_ids: Arc<DashMap<String, ()>>,
        kind: RegistryKind,
    ) -> Self {
        Self {
            repo,
            messages,
            authorizer,
            settings,
            seen_registry_ids,
            kind,
        }
    }

    fn check_enabled(&self) -> Result<()> {
        if !self.settings.enabled {
            return Err(Error::Disabled);
        }
        Ok(())
    }

    async fn check_access(&self, action: Action, scope_id: &str) -> Result<()> {
        self.authorizer
            .check_permission(Domain::Datastore, action, scope_id)
            .await
    }

    /// Point lookup, enriched with the last-published message.
    pub async fn find(&self, scope_id: &str, id: &StorableId) -> Result<Option<T>> {
        self.check_enabled()?;
        self.check_access(Action::Read, scope_id).await?;

        let Some(mut row) = self.repo.find(scope_id, id).await? else {
            return Ok(None);
        };
        self.enrich(&mut row).await?;
        Ok(Some(row))
    }

    /// Predicate query. Pass `fetch_last_published` when the caller needs
    /// the last-message fields; each returned row then costs one extra
    /// limit-1 message query.
    pub async fn query(
        &self,
        query: &StorableQuery,
        fetch_last_published: bool,
    ) -> Result<ListResult<T>> {
        self.check_enabled()?;
        self.check_access(Action::Read, &query.scope_id).await?;

        let mut result = self.repo.query(query).await?;
        if fetch_last_published {
            for row in &mut result.items {
                self.enrich(row).await?;
            }
        }
        Ok(result)
    }

    pub async fn count(&self, query: &StorableQuery) -> Result<u64> {
        self.check_enabled()?;
        self.check_access(Action::Read, &query.scope_id).await?;
        self.repo.count(query).await
    }

    /// Delete one registry row. Never cascades to the messages.
    pub async fn delete(&self, scope_id: &str, id: &StorableId) -> Result<()> {
        self.check_enabled()?;
        self.check_access(Action::Delete, scope_id).await?;
        self.repo.delete(scope_id, id).await?;
        // Forget the id so a later message can lazily re-create the row
        self.seen_registry_ids.remove(id.as_str());
        Ok(())
    }

    /// Delete every row matching the query's predicate.
    pub async fn delete_by_query(&self, query: &StorableQuery) -> Result<u64> {
        self.check_enabled()?;
        self.check_access(Action::Delete, &query.scope_id).await?;
        let deleted = self.repo.delete_by_query(query).await?;
        // The deleted ids are unknown here; drop the whole registration
        // cache so none of them stays pinned as "already registered".
        self.seen_registry_ids.clear();
        Ok(deleted)
    }

    /// Administrative: refresh this registry's indices across all scopes.
    pub async fn refresh_all_indexes(&self) -> Result<()> {
        self.repo.refresh_all_indexes().await
    }

    /// Administrative: delete this registry's indices across all scopes.
    pub async fn delete_all_indexes(&self) -> Result<()> {
        self.repo.delete_all_indexes().await?;
        self.seen_registry_ids.clear();
        Ok(())
    }

    /// Compute the last-published enrichment for one row.
    ///
    /// Exactly one hit is the normal outcome. Zero hits happens whenever
    /// message retention outpaced the registry and is only logged. More
    /// than one hit from a limit-1 query is a backend inconsistency: it
    /// is logged at error level and the row degrades to unenriched
    /// rather than failing the whole request.
    async fn enrich(&self, row: &mut T) -> Result<()> {
        let mut predicates = vec![
            Predicate::range(
                FIELD_TIMESTAMP,
                Some(format_timestamp(row.first_message_on()).into()),
                None,
            ),
            Predicate::term(FIELD_CLIENT_ID, row.client_id()),
        ];
        if let Some(channel) = row.channel() {
            predicates.push(Predicate::term(FIELD_CHANNEL, channel));
        }
        let query = StorableQuery::new(row.scope_id())
            .with_predicate(Predicate::and(predicates))
            .sorted_by(SortField::descending(FIELD_TIMESTAMP))
            .with_limit(1);

        let result = self.messages.query(&query).await?;
        match result.items.as_slice() {
            [message] => {
                if let Some(timestamp) = message.timestamp {
                    row.set_last_message(message.storable_id.clone(), timestamp);
                }
            }
            [] => {
                warn!(
                    registry = self.kind.as_str(),
                    id = %row.storable_id(),
                    client_id = row.client_id(),
                    "no message found for last-published enrichment; messages may have been truncated"
                );
            }
            hits => {
                error!(
                    registry = self.kind.as_str(),
                    id = %row.storable_id(),
                    hits = hits.len(),
                    "limit-1 last-published query returned more than one result"
                );
            }
        }
        Ok(())
    }
}
