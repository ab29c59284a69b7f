//! Datastore services
//!
//! The store layer wires the generic repository to the concrete entity
//! classes: the append-mostly message store with its mapping
//! synchronization, and the three first-seen registries with their
//! permission checks and last-published enrichment.

mod message;
mod registry;
mod schema;

pub use message::MessageStore;
pub use registry::{ChannelInfoStore, ClientInfoStore, MetricInfoStore, RegistryStore};
pub use schema::{
    message_index_schema, metric_mapping, registry_index_schema, FIELD_CHANNEL, FIELD_CLIENT_ID,
    FIELD_TIMESTAMP,
};

use std::sync::Arc;

use dashmap::DashMap;

use crate::auth::Authorizer;
use crate::client::SearchClient;
use crate::config::DatastoreSettings;
use crate::model::{ChannelInfo, ClientInfo, MetricInfo};
use crate::naming::{registry_index_name, RegistryKind};
use crate::repository::StorableRepository;
use crate::Result;

/// Fully wired datastore: message store plus the three registries,
/// sharing one search client, one settings snapshot and one
/// registration cache.
pub struct Datastore {
    pub messages: Arc<MessageStore>,
    pub clients: ClientInfoStore,
    pub channels: ChannelInfoStore,
    pub metrics: MetricInfoStore,
}

impl Datastore {
    pub fn new(
        client: Arc<dyn SearchClient>,
        settings: DatastoreSettings,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let settings = Arc::new(settings);
        let seen_registry_ids: Arc<DashMap<String, ()>> = Arc::new(DashMap::new());

        let client_repo = Arc::new(registry_repository::<ClientInfo>(
            client.clone(),
            settings.clone(),
            RegistryKind::Client,
        ));
        let channel_repo = Arc::new(registry_repository::<ChannelInfo>(
            client.clone(),
            settings.clone(),
            RegistryKind::Channel,
        ));
        let metric_repo = Arc::new(registry_repository::<MetricInfo>(
            client.clone(),
            settings.clone(),
            RegistryKind::Metric,
        ));

        let messages = Arc::new(MessageStore::new(
            client,
            settings.clone(),
            client_repo.clone(),
            channel_repo.clone(),
            metric_repo.clone(),
            seen_registry_ids.clone(),
        ));

        let clients = RegistryStore::new(
            client_repo,
            messages.clone(),
            authorizer.clone(),
            settings.clone(),
            seen_registry_ids.clone(),
            RegistryKind::Client,
        );
        let channels = RegistryStore::new(
            channel_repo,
            messages.clone(),
            authorizer.clone(),
            settings.clone(),
            seen_registry_ids.clone(),
            RegistryKind::Channel,
        );
        let metrics = RegistryStore::new(
            metric_repo,
            messages.clone(),
            authorizer,
            settings,
            seen_registry_ids,
            RegistryKind::Metric,
        );

        Self {
            messages,
            clients,
            channels,
            metrics,
        }
    }

    /// Refresh every datastore index (messages and registries).
    pub async fn refresh_all_indexes(&self) -> Result<()> {
        self.messages.refresh_all_indexes().await?;
        self.clients.refresh_all_indexes().await?;
        self.channels.refresh_all_indexes().await?;
        self.metrics.refresh_all_indexes().await
    }

    /// Delete every datastore index; used for scope teardown and tests.
    pub async fn delete_all_indexes(&self) -> Result<()> {
        self.messages.delete_all_indexes().await?;
        self.clients.delete_all_indexes().await?;
        self.channels.delete_all_indexes().await?;
        self.metrics.delete_all_indexes().await
    }
}

fn registry_repository<T: crate::model::Storable>(
    client: Arc<dyn SearchClient>,
    settings: Arc<DatastoreSettings>,
    kind: RegistryKind,
) -> StorableRepository<T> {
    let prefix = settings.index_prefix.clone();
    StorableRepository::new(
        client,
        settings,
        Arc::new(move |scope| registry_index_name(prefix.as_deref(), scope, kind)),
        Arc::new(move || registry_index_schema(kind)),
    )
}
