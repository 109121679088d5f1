//! Producer-facing facade over the event log and cursor.
//!
//! Every failure is returned to the caller wrapped as [`EventError::Store`];
//! nothing here retries.

use std::sync::Arc;

use horizon_core::{
    models::{Cursor, Event, EventId, NewEvent, ResourceType},
    CoreError, RequestContext,
};
use tracing::{debug, instrument};

use crate::{error::Result, storage::EventStorage};

/// Append and query access to the event log.
#[derive(Clone)]
pub struct EventStore {
    storage: Arc<dyn EventStorage>,
}

impl EventStore {
    /// Creates an event store over the given storage.
    pub fn new(storage: Arc<dyn EventStorage>) -> Self {
        Self { storage }
    }

    /// Records one event for a resource.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Store` if the append fails.
    pub async fn create_event(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        resource_id: i64,
        event_type: impl Into<String>,
        extra: Option<serde_json::Value>,
    ) -> Result<Event> {
        let mut event = NewEvent::new(resource_type, resource_id, event_type);
        event.extra = extra;

        let mut created = self.create_events(ctx, vec![event]).await?;
        created.pop().ok_or_else(|| CoreError::Store("append returned no event".to_string()).into())
    }

    /// Records several events atomically.
    ///
    /// Events without a request id inherit the one carried by `ctx`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Store` if the append fails; no event is stored.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), count = events.len()))]
    pub async fn create_events(&self, ctx: &RequestContext, mut events: Vec<NewEvent>) -> Result<Vec<Event>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        for event in &mut events {
            if event.req_id.as_deref().map_or(true, str::is_empty) {
                event.req_id = Some(ctx.request_id().to_string());
            }
        }

        let created = self.storage.append_events(ctx, &events).await?;
        for event in &created {
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                resource_type = %event.resource_type,
                resource_id = event.resource_id,
                "event recorded"
            );
        }
        Ok(created)
    }

    /// Lists events by offset and limit, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Store` if the query fails.
    pub async fn list_events(&self, offset: i64, limit: i64) -> Result<Vec<Event>> {
        Ok(self.storage.list_events(offset, limit).await?)
    }

    /// Lists events whose id lies in `[start, end]`, ascending.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Store` if the query fails.
    pub async fn list_events_range(&self, start: EventId, end: EventId) -> Result<Vec<Event>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.storage.list_events_range(start, end).await?)
    }

    /// Fetches one event.
    ///
    /// # Errors
    ///
    /// Returns a not-found store error if no event has that id.
    pub async fn get_event(&self, id: EventId) -> Result<Event> {
        self.storage
            .find_event(id)
            .await?
            .ok_or_else(|| CoreError::not_found("event", id).into())
    }

    /// Fetches the consumer cursor.
    ///
    /// # Errors
    ///
    /// Returns a not-found store error before the first save.
    pub async fn get_cursor(&self) -> Result<Cursor> {
        self.storage
            .find_cursor()
            .await?
            .ok_or_else(|| CoreError::not_found("cursor", "event consumer").into())
    }

    /// Creates the consumer cursor or advances it; lower positions are ignored.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Store` if the write fails.
    pub async fn save_cursor(&self, position: EventId) -> Result<Cursor> {
        Ok(self.storage.save_cursor(position).await?)
    }
}
