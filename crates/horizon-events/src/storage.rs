//! Storage abstraction for the event store and consumer.
//!
//! The consumer only needs a handful of reads and one cursor write. Keeping
//! them behind a trait lets the consumer loop be exercised against an
//! in-memory store, while production goes through the PostgreSQL
//! repositories in `horizon_core::storage`.

use std::sync::Arc;

use async_trait::async_trait;
use horizon_core::{
    error::Result,
    models::{Cursor, Event, EventId, NewEvent},
    storage::Storage,
    RequestContext,
};

/// Storage operations required by the event store and consumer.
#[async_trait]
pub trait EventStorage: Send + Sync + 'static {
    /// Appends events atomically, returning them with assigned ids.
    async fn append_events(&self, ctx: &RequestContext, events: &[NewEvent]) -> Result<Vec<Event>>;

    /// Lists events by offset and limit, ascending by id.
    async fn list_events(&self, offset: i64, limit: i64) -> Result<Vec<Event>>;

    /// Lists up to `limit` events with id greater than `after`, ascending.
    async fn list_events_after(&self, after: EventId, limit: i64) -> Result<Vec<Event>>;

    /// Lists events with id in `[start, end]`, ascending.
    async fn list_events_range(&self, start: EventId, end: EventId) -> Result<Vec<Event>>;

    /// Finds an event by id.
    async fn find_event(&self, id: EventId) -> Result<Option<Event>>;

    /// Loads the consumer cursor.
    async fn find_cursor(&self) -> Result<Option<Cursor>>;

    /// Creates the consumer cursor or advances it; lower positions are ignored.
    async fn save_cursor(&self, position: EventId) -> Result<Cursor>;
}

/// Production storage implementation using PostgreSQL.
pub struct PostgresEventStorage {
    storage: Arc<Storage>,
}

impl PostgresEventStorage {
    /// Creates a new PostgreSQL storage adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl EventStorage for PostgresEventStorage {
    async fn append_events(&self, ctx: &RequestContext, events: &[NewEvent]) -> Result<Vec<Event>> {
        self.storage.events.create_many(ctx, events).await
    }

    async fn list_events(&self, offset: i64, limit: i64) -> Result<Vec<Event>> {
        self.storage.events.list(offset, limit).await
    }

    async fn list_events_after(&self, after: EventId, limit: i64) -> Result<Vec<Event>> {
        self.storage.events.list_after(after, limit).await
    }

    async fn list_events_range(&self, start: EventId, end: EventId) -> Result<Vec<Event>> {
        self.storage.events.list_range(start, end).await
    }

    async fn find_event(&self, id: EventId) -> Result<Option<Event>> {
        self.storage.events.find_by_id(id).await
    }

    async fn find_cursor(&self) -> Result<Option<Cursor>> {
        self.storage.cursors.find().await
    }

    async fn save_cursor(&self, position: EventId) -> Result<Cursor> {
        self.storage.cursors.upsert(position).await
    }
}
