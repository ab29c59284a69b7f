//! # thingstore
//!
//! A telemetry datastore for IoT device fleets, backed by a
//! search-engine index.
//!
//! Device messages are routed into time-partitioned indices chosen from
//! their scope and timestamp, and the index field mapping evolves on the
//! fly as devices report previously-unseen metric names and types. Three
//! derived registries (known clients, known channels, known metrics)
//! answer "who/what/when" queries without scanning raw messages.
//!
//! ## Key Features
//!
//! - **Time-windowed indices**: one index per week/day/hour of message
//!   time, for cheap retention and query scoping
//! - **Incremental mappings**: the field mapping of an index grows by
//!   exactly the metrics it has not seen, guarded by a per-index lock
//! - **Idempotent registries**: registry rows carry ids derived from
//!   their (scope, client, channel, metric) tuple, so re-registering the
//!   same tuple never duplicates a row
//! - **Pluggable backend**: everything goes through the [`client::SearchClient`]
//!   trait; an in-memory implementation ships for development and tests
//!
//! ## Architecture
//!
//! - **[`store::MessageStore`]**: mapping synchronization, message
//!   inserts, lazy registry registration
//! - **[`store::RegistryStore`]**: permission-checked registry reads with
//!   last-published enrichment
//! - **[`repository::StorableRepository`]**: generic index lifecycle and
//!   CRUD/query machinery shared by every entity class

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod model;
pub mod naming;
pub mod query;
pub mod repository;
pub mod store;
pub mod telemetry;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::auth::{Action, AllowAllAuthorizer, Authorizer, Domain};
    pub use crate::client::{InMemorySearchClient, SearchClient};
    pub use crate::config::DatastoreSettings;
    pub use crate::model::{
        ChannelInfo, ClientInfo, DatastoreMessage, MetricInfo, MetricKind, MetricValue, Position,
        Storable, StorableId,
    };
    pub use crate::naming::IndexWindow;
    pub use crate::query::{
        FetchStyle, ListResult, Predicate, SortDirection, SortField, StorableQuery,
    };
    pub use crate::store::{Datastore, MessageStore};
    pub use crate::{Error, Result};
}
