//! Webhook log generation over a small resource hierarchy.
//!
//! ```text
//! root ── group 1 ── group 2 ── app 10 ── cluster 100
//!            └────── app 11 ── cluster 101
//! ```

use std::sync::Arc;

use chrono::Duration;
use horizon_core::{
    models::{event_types, Event, NewEvent, ResourceType, WebhookId, SECRET_HEADER},
    Clock, RequestContext, TestClock,
};
use horizon_events::{EventHandler, EventStore};
use horizon_testing::{fixtures, MemoryStore, Operation, StaticDirectory, WebhookBuilder};
use horizon_webhooks::{DeliveryError, WebhookLogGenerator};
use serde_json::Value;

struct Setup {
    store: Arc<MemoryStore>,
    events: EventStore,
    generator: WebhookLogGenerator,
    clock: Arc<TestClock>,
}

fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .group(1, None)
        .group(2, Some(1))
        .application(fixtures::application(10, 2))
        .application(fixtures::application(11, 1))
        .cluster(fixtures::cluster(100, 10))
        .cluster(fixtures::cluster(101, 11))
        .user(fixtures::user(7))
}

async fn setup() -> Setup {
    let clock = Arc::new(TestClock::new());
    let store = MemoryStore::shared(clock.clone());
    let now = clock.now_utc();

    for webhook in [
        WebhookBuilder::new(1, "https://root.example.com").build(),
        WebhookBuilder::new(2, "https://group.example.com")
            .on_group(1)
            .triggers(&[event_types::CLUSTERS_CREATED])
            .build(),
        WebhookBuilder::new(3, "https://app.example.com")
            .on_application(10)
            .triggers(&[event_types::CLUSTERS_DELETED])
            .build(),
        WebhookBuilder::new(4, "https://cluster.example.com").on_cluster(100).build(),
        WebhookBuilder::new(5, "https://other-cluster.example.com").on_cluster(101).build(),
        WebhookBuilder::new(6, "https://disabled.example.com").on_group(2).disabled().build(),
        WebhookBuilder::new(7, "https://future.example.com").created_at(now + Duration::hours(1)).build(),
    ] {
        store.put_webhook(webhook).await;
    }

    let generator = WebhookLogGenerator::new(store.clone(), Arc::new(directory()), clock.clone());
    Setup { events: EventStore::new(store.clone()), store, generator, clock }
}

async fn record(setup: &Setup, user: Option<i64>, events: Vec<NewEvent>) -> Vec<Event> {
    let ctx = RequestContext::new("req-1", user.map(fixtures::user));
    setup.events.create_events(&ctx, events).await.unwrap()
}

fn webhook_ids(logs: &[horizon_core::models::WebhookLog]) -> Vec<i64> {
    let mut ids: Vec<i64> = logs.iter().map(|log| log.webhook_id.0).collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn cluster_event_reaches_every_matching_scope() {
    let setup = setup().await;
    let events = record(&setup, Some(7), vec![fixtures::cluster_event(100, event_types::CLUSTERS_CREATED)]).await;

    let created = setup.generator.generate(&events, false).await.unwrap();

    assert_eq!(created, 3);
    let logs = setup.store.webhook_logs().await;
    assert_eq!(webhook_ids(&logs), vec![1, 2, 4]);
    assert!(logs.iter().all(|log| log.event_id == events[0].id && log.created_by == 7));
}

#[tokio::test]
async fn log_snapshots_request() {
    let setup = setup().await;
    let events = record(&setup, Some(7), vec![fixtures::cluster_event(100, event_types::CLUSTERS_CREATED)]).await;
    setup.generator.generate(&events, false).await.unwrap();

    let log = setup.store.webhook_logs_for(WebhookId(4)).await.remove(0);
    assert_eq!(log.url, "https://cluster.example.com");
    assert_eq!(log.request_headers.0.get(SECRET_HEADER).map(String::as_str), Some("secret-4"));

    let body: Value = serde_json::from_str(&log.request_data).unwrap();
    assert!(body.get("id").is_none());
    assert_eq!(body["eventID"], events[0].id.0);
    assert_eq!(body["webhookID"], 4);
    assert_eq!(body["eventType"], event_types::CLUSTERS_CREATED);
    assert_eq!(body["cluster"]["name"], "cluster-100");
    assert_eq!(body["application"]["name"], "app-10");
    assert_eq!(body["user"]["name"], "user-7");
}

#[tokio::test]
async fn application_event_has_no_cluster_scope() {
    let setup = setup().await;
    let events = record(&setup, None, vec![fixtures::application_event(10, event_types::APPLICATIONS_CREATED)]).await;

    setup.generator.generate(&events, false).await.unwrap();

    let logs = setup.store.webhook_logs().await;
    assert_eq!(webhook_ids(&logs), vec![1]);
    let body: Value = serde_json::from_str(&logs[0].request_data).unwrap();
    assert!(body.get("cluster").is_none());
    assert!(body["user"].is_null());
}

#[tokio::test]
async fn sibling_cluster_only_sees_its_own_scopes() {
    let setup = setup().await;
    let events = record(&setup, None, vec![fixtures::cluster_event(101, event_types::CLUSTERS_CREATED)]).await;

    setup.generator.generate(&events, false).await.unwrap();

    assert_eq!(webhook_ids(&setup.store.webhook_logs().await), vec![1, 2, 5]);
}

#[tokio::test]
async fn unresolvable_events_are_skipped() {
    let setup = setup().await;
    let events = record(
        &setup,
        None,
        vec![
            fixtures::cluster_event(999, event_types::CLUSTERS_CREATED),
            NewEvent::new(ResourceType::PipelineRun, 5, event_types::PIPELINERUNS_CREATED),
        ],
    )
    .await;

    assert_eq!(setup.generator.generate(&events, false).await.unwrap(), 0);
    assert!(setup.store.webhook_logs().await.is_empty());
}

#[tokio::test]
async fn resume_skips_pairs_that_already_have_logs() {
    let setup = setup().await;
    let events = record(&setup, None, vec![fixtures::cluster_event(100, event_types::CLUSTERS_CREATED)]).await;
    setup.generator.generate(&events, false).await.unwrap();

    setup
        .store
        .put_webhook(WebhookBuilder::new(8, "https://late.example.com").on_application(10).build())
        .await;
    let created = setup.generator.generate(&events, true).await.unwrap();

    assert_eq!(created, 1);
    assert_eq!(webhook_ids(&setup.store.webhook_logs().await), vec![1, 2, 4, 8]);
    assert_eq!(setup.generator.generate(&events, true).await.unwrap(), 0);
}

#[tokio::test]
async fn webhooks_registered_later_are_ignored_until_they_exist() {
    let setup = setup().await;
    let events = record(&setup, None, vec![fixtures::cluster_event(100, event_types::CLUSTERS_DEPLOYED)]).await;

    setup.generator.generate(&events, false).await.unwrap();
    assert_eq!(webhook_ids(&setup.store.webhook_logs().await), vec![1, 4]);

    setup.clock.advance(std::time::Duration::from_secs(7200));
    setup.generator.generate(&events, true).await.unwrap();
    assert_eq!(webhook_ids(&setup.store.webhook_logs().await), vec![1, 4, 7]);
}

#[tokio::test]
async fn failed_insert_stores_nothing() {
    let setup = setup().await;
    let events = record(&setup, None, vec![fixtures::cluster_event(100, event_types::CLUSTERS_CREATED)]).await;
    setup.store.fail_next(Operation::CreateWebhookLogs, 1).await;

    let err = setup.generator.generate(&events, false).await.unwrap_err();

    assert!(matches!(err, DeliveryError::Store(_)));
    assert!(setup.store.webhook_logs().await.is_empty());
}

#[tokio::test]
async fn handler_interface_reports_failures() {
    let setup = setup().await;
    let events = record(&setup, None, vec![fixtures::cluster_event(100, event_types::CLUSTERS_CREATED)]).await;
    setup.store.fail_next(Operation::ListWebhooks, 1).await;

    let handler: &dyn EventHandler = &setup.generator;
    assert!(handler.process(&events, false).await.is_err());
    handler.process(&events, false).await.unwrap();
    assert_eq!(setup.store.webhook_logs().await.len(), 3);
}
