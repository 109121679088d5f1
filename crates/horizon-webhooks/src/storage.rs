//! Storage abstraction for webhook log generation and delivery.
//!
//! Production goes through the PostgreSQL repositories; tests plug in an
//! in-memory implementation so generator and worker logic run without a
//! database.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use horizon_core::{
    error::Result,
    models::{
        DeliveryOutcome, EventId, NewWebhookLog, ResourceScope, Webhook, WebhookId, WebhookLog,
        WebhookLogId,
    },
    storage::Storage,
};
use horizon_events::ResumeMarker;

/// Storage operations required by the generator, workers and resend.
#[async_trait]
pub trait WebhookStorage: Send + Sync + 'static {
    /// Lists every webhook, enabled or not.
    async fn list_webhooks(&self) -> Result<Vec<Webhook>>;

    /// Finds a webhook by id.
    async fn find_webhook(&self, id: WebhookId) -> Result<Option<Webhook>>;

    /// Lists enabled webhooks registered on any of `scopes` and created no
    /// later than `created_before`.
    async fn list_enabled_webhooks(
        &self,
        scopes: &[ResourceScope],
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Webhook>>;

    /// Inserts waiting logs atomically.
    async fn create_webhook_logs(&self, logs: &[NewWebhookLog]) -> Result<Vec<WebhookLog>>;

    /// Inserts one waiting log.
    async fn create_webhook_log(&self, log: &NewWebhookLog) -> Result<WebhookLog>;

    /// Finds a log by id.
    async fn find_webhook_log(&self, id: WebhookLogId) -> Result<Option<WebhookLog>>;

    /// Lists logs matching any of the (event, webhook) pairs.
    async fn find_webhook_logs_by_pairs(&self, pairs: &[(EventId, WebhookId)]) -> Result<Vec<WebhookLog>>;

    /// Lists up to `limit` waiting logs of a webhook in ascending id order.
    async fn list_waiting_logs(&self, webhook_id: WebhookId, limit: i64) -> Result<Vec<WebhookLog>>;

    /// Records a terminal outcome on a waiting log; `false` if the log was
    /// not waiting anymore.
    async fn complete_webhook_log(&self, id: WebhookLogId, outcome: &DeliveryOutcome) -> Result<bool>;

    /// Greatest event id referenced by any log.
    async fn max_logged_event_id(&self) -> Result<Option<EventId>>;
}

/// Production storage implementation using PostgreSQL.
pub struct PostgresWebhookStorage {
    storage: Arc<Storage>,
}

impl PostgresWebhookStorage {
    /// Creates a new PostgreSQL storage adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl WebhookStorage for PostgresWebhookStorage {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        self.storage.webhooks.list_all().await
    }

    async fn find_webhook(&self, id: WebhookId) -> Result<Option<Webhook>> {
        self.storage.webhooks.find_by_id(id).await
    }

    async fn list_enabled_webhooks(
        &self,
        scopes: &[ResourceScope],
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Webhook>> {
        self.storage.webhooks.list_enabled_by_scopes(scopes, created_before).await
    }

    async fn create_webhook_logs(&self, logs: &[NewWebhookLog]) -> Result<Vec<WebhookLog>> {
        self.storage.webhook_logs.create_many(logs).await
    }

    async fn create_webhook_log(&self, log: &NewWebhookLog) -> Result<WebhookLog> {
        self.storage.webhook_logs.create(log).await
    }

    async fn find_webhook_log(&self, id: WebhookLogId) -> Result<Option<WebhookLog>> {
        self.storage.webhook_logs.find_by_id(id).await
    }

    async fn find_webhook_logs_by_pairs(&self, pairs: &[(EventId, WebhookId)]) -> Result<Vec<WebhookLog>> {
        self.storage.webhook_logs.find_by_pairs(pairs).await
    }

    async fn list_waiting_logs(&self, webhook_id: WebhookId, limit: i64) -> Result<Vec<WebhookLog>> {
        self.storage.webhook_logs.list_waiting(webhook_id, limit).await
    }

    async fn complete_webhook_log(&self, id: WebhookLogId, outcome: &DeliveryOutcome) -> Result<bool> {
        self.storage.webhook_logs.complete(id, outcome).await
    }

    async fn max_logged_event_id(&self) -> Result<Option<EventId>> {
        self.storage.webhook_logs.max_event_id().await
    }
}

/// Resume high-water mark derived from the webhook log table.
///
/// The mark is the greatest event id referenced by any log of any webhook.
pub struct LogHighWaterMark {
    storage: Arc<dyn WebhookStorage>,
}

impl LogHighWaterMark {
    /// Creates a marker reading from `storage`.
    pub fn new(storage: Arc<dyn WebhookStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ResumeMarker for LogHighWaterMark {
    async fn high_water_mark(&self) -> Result<Option<EventId>> {
        self.storage.max_logged_event_id().await
    }
}
