//! Delivery workers, the reconciling service and manual resend against a
//! mocked receiver.

use std::{collections::HashMap, sync::Arc, time::Duration};

use horizon_core::{
    models::{EventId, NewWebhookLog, Webhook, WebhookId, WebhookLog, WebhookLogId, WebhookLogStatus, SECRET_HEADER},
    RealClock, RequestContext,
};
use horizon_testing::{fixtures, MemoryStore, MockReceiver, Operation, WebhookBuilder};
use horizon_webhooks::{
    DeliveryClient, DeliveryConfig, DeliveryError, DeliveryService, WebhookLogService, WebhookWorker,
    WorkerSettings,
};
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use wiremock::ResponseTemplate;

fn store() -> Arc<MemoryStore> {
    MemoryStore::shared(Arc::new(RealClock::new()))
}

fn waiting_log(webhook: &Webhook, event_id: i64) -> NewWebhookLog {
    NewWebhookLog {
        webhook_id: webhook.id,
        event_id: EventId(event_id),
        url: webhook.url.clone(),
        request_headers: webhook.delivery_headers(),
        request_data: json!({
            "eventID": event_id,
            "webhookID": webhook.id.0,
            "eventType": "clusters_created",
            "user": null,
        })
        .to_string(),
        created_by: 0,
    }
}

fn worker(store: &Arc<MemoryStore>, webhook: Webhook) -> (WebhookWorker, watch::Sender<Webhook>) {
    let (sender, receiver) = watch::channel(webhook);
    let worker = WebhookWorker::new(
        receiver,
        store.clone(),
        Arc::new(DeliveryClient::with_defaults().unwrap()),
        WorkerSettings::default(),
        Arc::new(RealClock::new()),
        CancellationToken::new(),
    );
    (worker, sender)
}

async fn find_log(store: &MemoryStore, id: WebhookLogId) -> WebhookLog {
    store.webhook_logs().await.into_iter().find(|log| log.id == id).unwrap()
}

fn fast_config() -> DeliveryConfig {
    DeliveryConfig {
        reconcile_interval: Duration::from_millis(20),
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(5),
        ..DeliveryConfig::default()
    }
}

#[tokio::test]
async fn successful_delivery_is_recorded() {
    let receiver = MockReceiver::responding(200).await;
    let store = store();
    let webhook = WebhookBuilder::new(1, receiver.url()).build();
    let log = store.put_webhook_log(&waiting_log(&webhook, 42)).await;

    let (worker, _config) = worker(&store, webhook);
    assert_eq!(worker.process_pending().await.unwrap(), 1);

    let recorded = find_log(&store, log.id).await;
    assert_eq!(recorded.status, WebhookLogStatus::Success);
    assert_eq!(recorded.response_body.as_deref(), Some("ok"));
    assert!(recorded.error_message.is_none());

    let requests = receiver.requests().await;
    assert_eq!(requests.len(), 1);
    let secret = requests[0].headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
    assert_eq!(secret, Some("secret-1"));

    let body = &receiver.bodies().await[0];
    assert_eq!(body["id"], log.id.0);
    assert_eq!(body["eventID"], 42);
}

#[tokio::test]
async fn error_status_fails_without_retry() {
    let receiver = MockReceiver::start().await;
    receiver.respond_with(ResponseTemplate::new(500).set_body_string("boom")).await;
    let store = store();
    let webhook = WebhookBuilder::new(1, receiver.url()).build();
    let log = store.put_webhook_log(&waiting_log(&webhook, 1)).await;

    let (worker, _config) = worker(&store, webhook);
    assert_eq!(worker.process_pending().await.unwrap(), 1);
    assert_eq!(worker.process_pending().await.unwrap(), 0);

    let recorded = find_log(&store, log.id).await;
    assert_eq!(recorded.status, WebhookLogStatus::Failed);
    assert_eq!(recorded.error_message.as_deref(), Some("unexpected status code 500: boom"));
    assert_eq!(recorded.response_body.as_deref(), Some("boom"));
    assert_eq!(receiver.requests().await.len(), 1);
}

#[tokio::test]
async fn unreachable_receiver_fails_with_send_error() {
    let store = store();
    let webhook = WebhookBuilder::new(1, "http://127.0.0.1:1/hook").build();
    let log = store.put_webhook_log(&waiting_log(&webhook, 1)).await;

    let (worker, _config) = worker(&store, webhook);
    worker.process_pending().await.unwrap();

    let recorded = find_log(&store, log.id).await;
    assert_eq!(recorded.status, WebhookLogStatus::Failed);
    assert!(recorded.error_message.unwrap().starts_with("failed to send request"));
}

#[tokio::test]
async fn logs_are_delivered_in_id_order() {
    let receiver = MockReceiver::responding(200).await;
    let store = store();
    let webhook = WebhookBuilder::new(1, receiver.url()).build();
    for event_id in [3, 1, 2] {
        store.put_webhook_log(&waiting_log(&webhook, event_id)).await;
    }

    let (worker, _config) = worker(&store, webhook);
    assert_eq!(worker.process_pending().await.unwrap(), 3);

    let events: Vec<_> = receiver.bodies().await.iter().map(|body| body["eventID"].clone()).collect();
    assert_eq!(events, vec![json!(3), json!(1), json!(2)]);
}

#[tokio::test]
async fn worker_only_sees_its_own_webhook() {
    let receiver = MockReceiver::responding(200).await;
    let store = store();
    let mine = WebhookBuilder::new(1, receiver.url()).build();
    let other = WebhookBuilder::new(2, receiver.url()).build();
    store.put_webhook_log(&waiting_log(&mine, 1)).await;
    let foreign = store.put_webhook_log(&waiting_log(&other, 1)).await;

    let (worker, _config) = worker(&store, mine);
    assert_eq!(worker.process_pending().await.unwrap(), 1);

    assert_eq!(find_log(&store, foreign.id).await.status, WebhookLogStatus::Waiting);
}

#[tokio::test]
async fn listing_failure_is_returned_to_the_loop() {
    let store = store();
    store.fail_next(Operation::ListWaitingLogs, 1).await;

    let (worker, _config) = worker(&store, WebhookBuilder::new(1, "http://127.0.0.1:1/hook").build());

    assert!(matches!(worker.process_pending().await, Err(DeliveryError::Store(_))));
    assert_eq!(worker.process_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn resend_queues_new_attempt_and_keeps_original() {
    let receiver = MockReceiver::start().await;
    receiver.respond_with(ResponseTemplate::new(502)).await;
    let store = store();
    let webhook = WebhookBuilder::new(1, receiver.url()).build();
    let original = store.put_webhook_log(&waiting_log(&webhook, 7)).await;

    let (worker, _config) = worker(&store, webhook);
    worker.process_pending().await.unwrap();

    let service = WebhookLogService::new(store.clone());
    let ctx = RequestContext::new("req-resend", Some(fixtures::user(9)));
    let resent = service.resend(&ctx, original.id).await.unwrap();

    assert_ne!(resent.id, original.id);
    assert_eq!(resent.status, WebhookLogStatus::Waiting);
    assert_eq!(resent.created_by, 9);
    assert_eq!(resent.request_data, original.request_data);
    assert!(resent.error_message.is_none() && resent.response_body.is_none());

    worker.process_pending().await.unwrap();
    assert_eq!(find_log(&store, original.id).await.status, WebhookLogStatus::Failed);
    assert_eq!(find_log(&store, resent.id).await.status, WebhookLogStatus::Failed);

    let ids: Vec<_> = receiver.bodies().await.iter().map(|body| body["id"].clone()).collect();
    assert_eq!(ids, vec![json!(original.id.0), json!(resent.id.0)]);
}

#[tokio::test]
async fn resend_of_missing_log_is_not_found() {
    let service = WebhookLogService::new(store());

    let err = service.resend(&RequestContext::system(), WebhookLogId(404)).await.unwrap_err();

    assert!(matches!(err, DeliveryError::NotFound { id: 404, .. }));
}

#[tokio::test]
async fn reconcile_tracks_enabled_webhooks() {
    let store = store();
    store.put_webhook(WebhookBuilder::new(1, "http://127.0.0.1:1/a").build()).await;
    store.put_webhook(WebhookBuilder::new(2, "http://127.0.0.1:1/b").disabled().build()).await;

    let mut service = DeliveryService::new(store.clone(), fast_config(), Arc::new(RealClock::new())).unwrap();

    let report = service.reconcile().await.unwrap();
    assert_eq!(report.started, vec![WebhookId(1)]);
    assert_eq!(service.active_workers(), vec![WebhookId(1)]);
    assert!(service.reconcile().await.unwrap().is_empty());

    let edited = WebhookBuilder::new(1, "http://127.0.0.1:1/a")
        .ssl_verify(false)
        .updated_at(chrono::Utc::now())
        .build();
    store.put_webhook(edited).await;
    let report = service.reconcile().await.unwrap();
    assert_eq!(report.updated, vec![WebhookId(1)]);
    assert!(report.started.is_empty() && report.stopped.is_empty());
    assert!(!service.worker_config(WebhookId(1)).unwrap().ssl_verify_enabled);

    store.put_webhook(WebhookBuilder::new(1, "http://127.0.0.1:1/a").disabled().build()).await;
    store.put_webhook(WebhookBuilder::new(3, "http://127.0.0.1:1/c").build()).await;
    let report = service.reconcile().await.unwrap();
    assert_eq!(report.stopped, vec![WebhookId(1)]);
    assert_eq!(report.started, vec![WebhookId(3)]);

    store.remove_webhook(WebhookId(3)).await;
    let report = service.reconcile().await.unwrap();
    assert_eq!(report.stopped, vec![WebhookId(3)]);
    assert!(service.active_workers().is_empty());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn swapped_config_applies_to_next_attempt() {
    let receiver = MockReceiver::responding(200).await;
    let store = store();
    let webhook = WebhookBuilder::new(1, receiver.url()).build();
    let (worker, config) = worker(&store, webhook.clone());
    assert!(worker.ssl_verify_enabled());

    config.send_replace(WebhookBuilder::new(1, receiver.url()).ssl_verify(false).build());
    assert!(!worker.ssl_verify_enabled());

    let log = store.put_webhook_log(&waiting_log(&webhook, 7)).await;
    assert_eq!(worker.process_pending().await.unwrap(), 1);
    assert_eq!(find_log(&store, log.id).await.status, WebhookLogStatus::Success);
}

#[tokio::test]
async fn failed_listing_leaves_workers_untouched() {
    let store = store();
    store.put_webhook(WebhookBuilder::new(1, "http://127.0.0.1:1/a").build()).await;
    let mut service = DeliveryService::new(store.clone(), fast_config(), Arc::new(RealClock::new())).unwrap();
    service.reconcile().await.unwrap();

    store.fail_next(Operation::ListWebhooks, 1).await;
    assert!(service.reconcile().await.is_err());
    assert_eq!(service.active_workers(), vec![WebhookId(1)]);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn running_service_delivers_and_drains_on_cancel() {
    let receiver = MockReceiver::responding(200).await;
    let store = store();
    let webhook = WebhookBuilder::new(1, receiver.url()).build();
    store.put_webhook(webhook.clone()).await;
    let log = store.put_webhook_log(&waiting_log(&webhook, 1)).await;

    let service = DeliveryService::new(store.clone(), fast_config(), Arc::new(RealClock::new())).unwrap();
    let token = CancellationToken::new();
    let handle = tokio::spawn(service.run(token.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while find_log(&store, log.id).await.status == WebhookLogStatus::Waiting {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("log not delivered in time");

    token.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(find_log(&store, log.id).await.status, WebhookLogStatus::Success);
    assert_eq!(receiver.requests().await.len(), 1);
}

#[tokio::test]
async fn snapshotted_headers_are_sent_verbatim() {
    let receiver = MockReceiver::responding(204).await;
    let store = store();
    let webhook = WebhookBuilder::new(1, receiver.url()).secret("rotated").build();

    let mut new_log = waiting_log(&webhook, 1);
    new_log.request_headers = HashMap::from([(SECRET_HEADER.to_string(), "original".to_string())]);
    store.put_webhook_log(&new_log).await;

    let (worker, _config) = worker(&store, webhook);
    worker.process_pending().await.unwrap();

    let requests = receiver.requests().await;
    let secret = requests[0].headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
    assert_eq!(secret, Some("original"));
}
