//! Storage abstraction for retention cleanup.

use std::sync::Arc;

use async_trait::async_trait;
use horizon_core::{
    error::Result,
    models::{Event, EventId, WebhookLog, WebhookLogId},
    storage::Storage,
};

/// Paged scans and batch deletes over events and webhook logs.
#[async_trait]
pub trait RetentionStorage: Send + Sync + 'static {
    /// Lists up to `limit` events with id greater than `after`, ascending.
    async fn list_events_after(&self, after: EventId, limit: i64) -> Result<Vec<Event>>;

    /// Deletes events by id, returning how many rows were removed.
    async fn delete_events(&self, ids: &[EventId]) -> Result<u64>;

    /// Lists up to `limit` webhook logs with id greater than `after`,
    /// ascending.
    async fn list_webhook_logs_after(&self, after: WebhookLogId, limit: i64) -> Result<Vec<WebhookLog>>;

    /// Deletes webhook logs by id, returning how many rows were removed.
    async fn delete_webhook_logs(&self, ids: &[WebhookLogId]) -> Result<u64>;
}

/// Production storage implementation using PostgreSQL.
pub struct PostgresRetentionStorage {
    storage: Arc<Storage>,
}

impl PostgresRetentionStorage {
    /// Creates a new PostgreSQL storage adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl RetentionStorage for PostgresRetentionStorage {
    async fn list_events_after(&self, after: EventId, limit: i64) -> Result<Vec<Event>> {
        self.storage.events.list_after(after, limit).await
    }

    async fn delete_events(&self, ids: &[EventId]) -> Result<u64> {
        self.storage.events.delete_by_ids(ids).await
    }

    async fn list_webhook_logs_after(&self, after: WebhookLogId, limit: i64) -> Result<Vec<WebhookLog>> {
        self.storage.webhook_logs.list_after(after, limit).await
    }

    async fn delete_webhook_logs(&self, ids: &[WebhookLogId]) -> Result<u64> {
        self.storage.webhook_logs.delete_by_ids(ids).await
    }
}
