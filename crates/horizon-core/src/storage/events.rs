//! Repository for the append-only event log.
//!
//! Events are written once by producers and read in id order by the
//! consumer. The only mutation besides insertion is deletion by the
//! retention cleaner.

use std::sync::Arc;

use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::{
    context::RequestContext,
    error::Result,
    models::{Event, EventId, NewEvent},
};

const SELECT_COLUMNS: &str = r"
    SELECT id, resource_type, resource_id, event_type, extra, req_id, created_by, created_at
    FROM events
";

/// Repository for event database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Appends a batch of events atomically.
    ///
    /// Either every event is stored or none is. Returned events carry their
    /// assigned ids in input order.
    ///
    /// # Errors
    ///
    /// Returns error if any insert fails; the transaction is rolled back.
    pub async fn create_many(&self, ctx: &RequestContext, events: &[NewEvent]) -> Result<Vec<Event>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(events.len());
        for event in events {
            created.push(self.create_in_tx(&mut tx, ctx, event).await?);
        }
        tx.commit().await?;
        Ok(created)
    }

    /// Appends one event within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ctx: &RequestContext,
        event: &NewEvent,
    ) -> Result<Event> {
        self.create_impl(&mut **tx, ctx, event).await
    }

    async fn create_impl<'e, E>(&self, executor: E, ctx: &RequestContext, event: &NewEvent) -> Result<Event>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let req_id = event.req_id.as_deref().unwrap_or_else(|| ctx.request_id());

        let event = sqlx::query_as::<_, Event>(
            r"
            INSERT INTO events (resource_type, resource_id, event_type, extra, req_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, resource_type, resource_id, event_type, extra, req_id, created_by, created_at
            ",
        )
        .bind(&event.resource_type)
        .bind(event.resource_id)
        .bind(&event.event_type)
        .bind(&event.extra)
        .bind(req_id)
        .bind(ctx.user_id())
        .fetch_one(executor)
        .await?;

        Ok(event)
    }

    /// Finds an event by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: EventId) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(event)
    }

    /// Lists up to `limit` events with id strictly greater than `after`,
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list_after(&self, after: EventId, limit: i64) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "{SELECT_COLUMNS} WHERE id > $1 ORDER BY id ASC LIMIT $2"
        ))
        .bind(after)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(events)
    }

    /// Lists events by offset and limit, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "{SELECT_COLUMNS} ORDER BY id ASC OFFSET $1 LIMIT $2"
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(events)
    }

    /// Lists events whose id lies in `[start, end]`, ascending.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list_range(&self, start: EventId, end: EventId) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "{SELECT_COLUMNS} WHERE id BETWEEN $1 AND $2 ORDER BY id ASC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&*self.pool)
        .await?;

        Ok(events)
    }

    /// Deletes events by id, returning the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete_by_ids(&self, ids: &[EventId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();

        let result = sqlx::query("DELETE FROM events WHERE id = ANY($1)")
            .bind(&raw)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
