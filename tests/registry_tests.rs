//! Registry service tests
//!
//! Last-published enrichment outcomes, the datastore feature flag and
//! the permission gate.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use thingstore::auth::{AllowAllAuthorizer, DenyAllAuthorizer};
use thingstore::client::InMemorySearchClient;
use thingstore::config::DatastoreSettings;
use thingstore::model::{DatastoreMessage, MetricValue, StorableId};
use thingstore::query::{Predicate, StorableQuery};
use thingstore::store::Datastore;
use thingstore::Error;

fn datastore() -> Datastore {
    Datastore::new(
        Arc::new(InMemorySearchClient::new()),
        DatastoreSettings::default(),
        Arc::new(AllowAllAuthorizer),
    )
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 5, 4, hour, 0, 0).unwrap()
}

fn message_at(time: DateTime<Utc>) -> DatastoreMessage {
    let mut message = DatastoreMessage::new("scope-1", "client-1");
    message.channel = vec!["plant".to_string(), "line-3".to_string()];
    message.timestamp = Some(time);
    message
        .metrics
        .insert("temperature".to_string(), MetricValue::Double(21.5));
    message
}

async fn channel_row_id(datastore: &Datastore) -> StorableId {
    datastore
        .channels
        .query(&StorableQuery::new("scope-1"), false)
        .await
        .unwrap()
        .first()
        .expect("channel row should exist")
        .storable_id
        .clone()
}

#[tokio::test]
async fn test_find_enriches_with_latest_message() {
    let datastore = datastore();

    datastore.messages.store(&message_at(at(10))).await.unwrap();
    datastore.messages.store(&message_at(at(11))).await.unwrap();
    let last_id = datastore.messages.store(&message_at(at(12))).await.unwrap();

    let row_id = channel_row_id(&datastore).await;
    let row = datastore
        .channels
        .find("scope-1", &row_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(row.first_message_on, at(10));
    assert_eq!(row.last_message_on, Some(at(12)));
    assert_eq!(row.last_message_id, Some(last_id));
}

#[tokio::test]
async fn test_enrichment_degrades_when_messages_are_gone() {
    let datastore = datastore();

    datastore.messages.store(&message_at(at(10))).await.unwrap();
    datastore.messages.store(&message_at(at(11))).await.unwrap();
    let row_id = channel_row_id(&datastore).await;

    // Simulate retention: the messages expire, the registry row stays
    let deleted = datastore
        .messages
        .delete_by_query(
            &StorableQuery::new("scope-1")
                .with_predicate(Predicate::term("client_id", "client-1")),
        )
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let row = datastore
        .channels
        .find("scope-1", &row_id)
        .await
        .unwrap()
        .expect("registry row survives message deletion");
    assert_eq!(row.last_message_id, None);
    assert_eq!(row.last_message_on, None);
}

#[tokio::test]
async fn test_query_enriches_only_on_request() {
    let datastore = datastore();
    datastore.messages.store(&message_at(at(10))).await.unwrap();

    let plain = datastore
        .channels
        .query(&StorableQuery::new("scope-1"), false)
        .await
        .unwrap();
    assert_eq!(plain.first().unwrap().last_message_on, None);

    let enriched = datastore
        .channels
        .query(&StorableQuery::new("scope-1"), true)
        .await
        .unwrap();
    assert_eq!(enriched.first().unwrap().last_message_on, Some(at(10)));
}

#[tokio::test]
async fn test_client_and_metric_registries_enrich_too() {
    let datastore = datastore();
    datastore.messages.store(&message_at(at(10))).await.unwrap();
    datastore.messages.store(&message_at(at(15))).await.unwrap();

    let clients = datastore
        .clients
        .query(&StorableQuery::new("scope-1"), true)
        .await
        .unwrap();
    assert_eq!(clients.first().unwrap().last_message_on, Some(at(15)));

    let metrics = datastore
        .metrics
        .query(&StorableQuery::new("scope-1"), true)
        .await
        .unwrap();
    assert_eq!(metrics.first().unwrap().last_message_on, Some(at(15)));
}

#[tokio::test]
async fn test_disabled_datastore_rejects_every_operation() {
    let settings = DatastoreSettings {
        enabled: false,
        ..Default::default()
    };
    let datastore = Datastore::new(
        Arc::new(InMemorySearchClient::new()),
        settings,
        Arc::new(AllowAllAuthorizer),
    );

    assert!(matches!(
        datastore.messages.store(&message_at(at(10))).await,
        Err(Error::Disabled)
    ));
    assert!(matches!(
        datastore
            .channels
            .find("scope-1", &StorableId::from("x"))
            .await,
        Err(Error::Disabled)
    ));
    assert!(matches!(
        datastore
            .clients
            .query(&StorableQuery::new("scope-1"), false)
            .await,
        Err(Error::Disabled)
    ));
}

#[tokio::test]
async fn test_denied_permission_fails_registry_reads() {
    let datastore = Datastore::new(
        Arc::new(InMemorySearchClient::new()),
        DatastoreSettings::default(),
        Arc::new(DenyAllAuthorizer),
    );

    assert!(matches!(
        datastore
            .channels
            .find("scope-1", &StorableId::from("x"))
            .await,
        Err(Error::Unauthorized(_))
    ));
    assert!(matches!(
        datastore
            .metrics
            .delete("scope-1", &StorableId::from("x"))
            .await,
        Err(Error::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_registry_delete_does_not_cascade_to_messages() {
    let datastore = datastore();
    datastore.messages.store(&message_at(at(10))).await.unwrap();

    let row_id = channel_row_id(&datastore).await;
    datastore.channels.delete("scope-1", &row_id).await.unwrap();

    assert_eq!(
        datastore
            .messages
            .count(&StorableQuery::new("scope-1"))
            .await
            .unwrap(),
        1,
        "messages survive registry deletion"
    );
}

#[tokio::test]
async fn test_enrichment_is_scoped_to_the_channel() {
    let datastore = datastore();
    datastore.messages.store(&message_at(at(10))).await.unwrap();

    // A later message on a different channel must not leak into the
    // first channel's enrichment
    let mut other = message_at(at(18));
    other.channel = vec!["plant".to_string(), "line-4".to_string()];
    datastore.messages.store(&other).await.unwrap();

    let channels = datastore
        .channels
        .query(&StorableQuery::new("scope-1"), true)
        .await
        .unwrap();
    let line_3 = channels
        .items
        .iter()
        .find(|c| c.name == "plant/line-3")
        .unwrap();
    assert_eq!(line_3.last_message_on, Some(at(10)));

    let line_4 = channels
        .items
        .iter()
        .find(|c| c.name == "plant/line-4")
        .unwrap();
    assert_eq!(line_4.last_message_on, Some(at(18)));
}
