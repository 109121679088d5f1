//! In-memory implementation of every storage trait of the pipeline.
//!
//! One [`MemoryStore`] stands in for the whole database: the event store,
//! consumer, generator, delivery workers and cleaner can all share it, so
//! end-to-end flows run without PostgreSQL. Timestamps come from the
//! injected clock, and individual operations can be made to fail a given
//! number of times to exercise retry paths.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use horizon_cleaner::RetentionStorage;
use horizon_core::{
    error::{CoreError, Result},
    models::{
        Cursor, DeliveryOutcome, Event, EventId, NewEvent, NewWebhookLog, ResourceScope, Webhook,
        WebhookId, WebhookLog, WebhookLogId, WebhookLogStatus,
    },
    Clock, RealClock, RequestContext,
};
use horizon_events::EventStorage;
use horizon_webhooks::WebhookStorage;
use sqlx::types::Json;
use tokio::sync::RwLock;

/// Storage operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Appending events.
    AppendEvents,
    /// Listing events after a position or in a range.
    ListEvents,
    /// Loading the consumer cursor.
    FindCursor,
    /// Saving the consumer cursor.
    SaveCursor,
    /// Listing webhooks.
    ListWebhooks,
    /// Inserting webhook logs.
    CreateWebhookLogs,
    /// Listing waiting logs.
    ListWaitingLogs,
    /// Completing a log.
    CompleteWebhookLog,
    /// Reading the logged high-water mark.
    MaxLoggedEventId,
    /// Listing webhook logs for retention.
    ListWebhookLogs,
    /// Deleting events or webhook logs.
    Delete,
}

#[derive(Default)]
struct State {
    events: BTreeMap<EventId, Event>,
    cursor: Option<Cursor>,
    webhooks: BTreeMap<WebhookId, Webhook>,
    logs: BTreeMap<WebhookLogId, WebhookLog>,
    next_event_id: i64,
    next_log_id: i64,
    failures: HashMap<Operation, u32>,
    cursor_saves: usize,
}

impl State {
    fn check(&mut self, operation: Operation) -> Result<()> {
        match self.failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(CoreError::Store(format!("injected failure: {operation:?}")))
            },
            _ => Ok(()),
        }
    }

    fn insert_log(&mut self, log: &NewWebhookLog, now: DateTime<Utc>) -> WebhookLog {
        self.next_log_id += 1;
        let created = WebhookLog {
            id: WebhookLogId(self.next_log_id),
            webhook_id: log.webhook_id,
            event_id: log.event_id,
            url: log.url.clone(),
            request_headers: Json(log.request_headers.clone()),
            request_data: log.request_data.clone(),
            response_headers: None,
            response_body: None,
            status: WebhookLogStatus::Waiting,
            error_message: None,
            created_at: now,
            created_by: log.created_by,
            updated_at: now,
        };
        self.logs.insert(created.id, created.clone());
        created
    }
}

/// Shared in-memory database.
pub struct MemoryStore {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Creates an empty store stamping rows with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { state: RwLock::new(State::default()), clock }
    }

    /// Creates an empty store behind an `Arc`.
    pub fn shared(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self::new(clock))
    }

    /// Makes the next `times` calls of `operation` fail with a store error.
    pub async fn fail_next(&self, operation: Operation, times: u32) {
        self.state.write().await.failures.insert(operation, times);
    }

    /// Inserts or replaces a webhook.
    pub async fn put_webhook(&self, webhook: Webhook) {
        self.state.write().await.webhooks.insert(webhook.id, webhook);
    }

    /// Removes a webhook; its logs are kept.
    pub async fn remove_webhook(&self, id: WebhookId) {
        self.state.write().await.webhooks.remove(&id);
    }

    /// Inserts an event with a fixed id and timestamp, bypassing the
    /// producer path.
    pub async fn put_event(&self, event: Event) {
        let mut state = self.state.write().await;
        state.next_event_id = state.next_event_id.max(event.id.0);
        state.events.insert(event.id, event);
    }

    /// Inserts a waiting log and returns it.
    pub async fn put_webhook_log(&self, log: &NewWebhookLog) -> WebhookLog {
        let now = self.clock.now_utc();
        self.state.write().await.insert_log(log, now)
    }

    /// Overwrites the status and last update time of a stored log.
    pub async fn set_webhook_log_status(&self, id: WebhookLogId, status: WebhookLogStatus, updated_at: DateTime<Utc>) {
        if let Some(log) = self.state.write().await.logs.get_mut(&id) {
            log.status = status;
            log.updated_at = updated_at;
        }
    }

    /// Sets the persisted consumer cursor.
    pub async fn set_cursor(&self, position: EventId) {
        let updated_at = self.clock.now_utc();
        self.state.write().await.cursor = Some(Cursor { id: 1, position, updated_at });
    }

    /// Persisted consumer cursor position, if any.
    pub async fn cursor_position(&self) -> Option<EventId> {
        self.state.read().await.cursor.as_ref().map(|cursor| cursor.position)
    }

    /// How many times the cursor was saved through the storage trait.
    pub async fn cursor_saves(&self) -> usize {
        self.state.read().await.cursor_saves
    }

    /// Every stored event in id order.
    pub async fn events(&self) -> Vec<Event> {
        self.state.read().await.events.values().cloned().collect()
    }

    /// Every stored log in id order.
    pub async fn webhook_logs(&self) -> Vec<WebhookLog> {
        self.state.read().await.logs.values().cloned().collect()
    }

    /// Logs of one webhook in id order.
    pub async fn webhook_logs_for(&self, webhook_id: WebhookId) -> Vec<WebhookLog> {
        self.state.read().await.logs.values().filter(|log| log.webhook_id == webhook_id).cloned().collect()
    }

    fn range_events(state: &State, after: EventId, limit: i64) -> Vec<Event> {
        let limit = usize::try_from(limit).unwrap_or(0);
        state.events.range(EventId(after.0 + 1)..).map(|(_, event)| event.clone()).take(limit).collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(RealClock::new()))
    }
}

#[async_trait]
impl EventStorage for MemoryStore {
    async fn append_events(&self, ctx: &RequestContext, events: &[NewEvent]) -> Result<Vec<Event>> {
        let now = self.clock.now_utc();
        let mut state = self.state.write().await;
        state.check(Operation::AppendEvents)?;

        let mut created = Vec::with_capacity(events.len());
        for new in events {
            state.next_event_id += 1;
            let event = Event {
                id: EventId(state.next_event_id),
                resource_type: new.resource_type.clone(),
                resource_id: new.resource_id,
                event_type: new.event_type.clone(),
                extra: new.extra.clone(),
                req_id: new.req_id.clone().unwrap_or_else(|| ctx.request_id().to_string()),
                created_by: ctx.user_id(),
                created_at: now,
            };
            state.events.insert(event.id, event.clone());
            created.push(event);
        }
        Ok(created)
    }

    async fn list_events(&self, offset: i64, limit: i64) -> Result<Vec<Event>> {
        let mut state = self.state.write().await;
        state.check(Operation::ListEvents)?;
        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state.events.values().skip(offset).take(limit).cloned().collect())
    }

    async fn list_events_after(&self, after: EventId, limit: i64) -> Result<Vec<Event>> {
        let mut state = self.state.write().await;
        state.check(Operation::ListEvents)?;
        Ok(Self::range_events(&state, after, limit))
    }

    async fn list_events_range(&self, start: EventId, end: EventId) -> Result<Vec<Event>> {
        let mut state = self.state.write().await;
        state.check(Operation::ListEvents)?;
        if start > end {
            return Ok(Vec::new());
        }
        Ok(state.events.range(start..=end).map(|(_, event)| event.clone()).collect())
    }

    async fn find_event(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.state.read().await.events.get(&id).cloned())
    }

    async fn find_cursor(&self) -> Result<Option<Cursor>> {
        let mut state = self.state.write().await;
        state.check(Operation::FindCursor)?;
        Ok(state.cursor.clone())
    }

    async fn save_cursor(&self, position: EventId) -> Result<Cursor> {
        let updated_at = self.clock.now_utc();
        let mut state = self.state.write().await;
        state.check(Operation::SaveCursor)?;
        let position = state.cursor.as_ref().map_or(position, |cursor| cursor.position.max(position));
        let cursor = Cursor { id: 1, position, updated_at };
        state.cursor = Some(cursor.clone());
        state.cursor_saves += 1;
        Ok(cursor)
    }
}

#[async_trait]
impl WebhookStorage for MemoryStore {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        let mut state = self.state.write().await;
        state.check(Operation::ListWebhooks)?;
        Ok(state.webhooks.values().cloned().collect())
    }

    async fn find_webhook(&self, id: WebhookId) -> Result<Option<Webhook>> {
        Ok(self.state.read().await.webhooks.get(&id).cloned())
    }

    async fn list_enabled_webhooks(
        &self,
        scopes: &[ResourceScope],
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Webhook>> {
        let mut state = self.state.write().await;
        state.check(Operation::ListWebhooks)?;
        Ok(state
            .webhooks
            .values()
            .filter(|webhook| webhook.enabled && webhook.created_at <= created_before)
            .filter(|webhook| scopes.contains(&webhook.scope()))
            .cloned()
            .collect())
    }

    async fn create_webhook_logs(&self, logs: &[NewWebhookLog]) -> Result<Vec<WebhookLog>> {
        let now = self.clock.now_utc();
        let mut state = self.state.write().await;
        state.check(Operation::CreateWebhookLogs)?;
        Ok(logs.iter().map(|log| state.insert_log(log, now)).collect())
    }

    async fn create_webhook_log(&self, log: &NewWebhookLog) -> Result<WebhookLog> {
        let now = self.clock.now_utc();
        let mut state = self.state.write().await;
        state.check(Operation::CreateWebhookLogs)?;
        Ok(state.insert_log(log, now))
    }

    async fn find_webhook_log(&self, id: WebhookLogId) -> Result<Option<WebhookLog>> {
        Ok(self.state.read().await.logs.get(&id).cloned())
    }

    async fn find_webhook_logs_by_pairs(&self, pairs: &[(EventId, WebhookId)]) -> Result<Vec<WebhookLog>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .values()
            .filter(|log| pairs.contains(&(log.event_id, log.webhook_id)))
            .cloned()
            .collect())
    }

    async fn list_waiting_logs(&self, webhook_id: WebhookId, limit: i64) -> Result<Vec<WebhookLog>> {
        let mut state = self.state.write().await;
        state.check(Operation::ListWaitingLogs)?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .logs
            .values()
            .filter(|log| log.webhook_id == webhook_id && log.status == WebhookLogStatus::Waiting)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn complete_webhook_log(&self, id: WebhookLogId, outcome: &DeliveryOutcome) -> Result<bool> {
        let now = self.clock.now_utc();
        let mut state = self.state.write().await;
        state.check(Operation::CompleteWebhookLog)?;
        let Some(log) = state.logs.get_mut(&id) else {
            return Ok(false);
        };
        if log.status != WebhookLogStatus::Waiting {
            return Ok(false);
        }

        log.status = outcome.status;
        log.response_headers = outcome.response_headers.clone().map(Json);
        log.response_body = outcome.response_body.clone();
        log.error_message = outcome.error_message.clone();
        log.updated_at = now;
        Ok(true)
    }

    async fn max_logged_event_id(&self) -> Result<Option<EventId>> {
        let mut state = self.state.write().await;
        state.check(Operation::MaxLoggedEventId)?;
        Ok(state.logs.values().map(|log| log.event_id).max())
    }
}

#[async_trait]
impl RetentionStorage for MemoryStore {
    async fn list_events_after(&self, after: EventId, limit: i64) -> Result<Vec<Event>> {
        let mut state = self.state.write().await;
        state.check(Operation::ListEvents)?;
        Ok(Self::range_events(&state, after, limit))
    }

    async fn delete_events(&self, ids: &[EventId]) -> Result<u64> {
        let mut state = self.state.write().await;
        state.check(Operation::Delete)?;
        Ok(ids.iter().filter(|id| state.events.remove(*id).is_some()).count() as u64)
    }

    async fn list_webhook_logs_after(&self, after: WebhookLogId, limit: i64) -> Result<Vec<WebhookLog>> {
        let mut state = self.state.write().await;
        state.check(Operation::ListWebhookLogs)?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state.logs.range(WebhookLogId(after.0 + 1)..).map(|(_, log)| log.clone()).take(limit).collect())
    }

    async fn delete_webhook_logs(&self, ids: &[WebhookLogId]) -> Result<u64> {
        let mut state = self.state.write().await;
        state.check(Operation::Delete)?;
        Ok(ids.iter().filter(|id| state.logs.remove(*id).is_some()).count() as u64)
    }
}
