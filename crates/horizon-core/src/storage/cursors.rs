//! Repository for the consumer's singleton cursor row.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Cursor, EventId},
};

/// Row id of the only cursor in the system.
pub const CURSOR_ROW_ID: i64 = 1;

/// Repository for cursor database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Loads the cursor, or `None` before the first save.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find(&self) -> Result<Option<Cursor>> {
        let cursor = sqlx::query_as::<_, Cursor>(
            r"
            SELECT id, position, updated_at
            FROM event_cursors
            WHERE id = $1
            ",
        )
        .bind(CURSOR_ROW_ID)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(cursor)
    }

    /// Creates the cursor or advances its position.
    ///
    /// A position lower than the stored one is ignored, so a replica that
    /// lost the lease cannot move the cursor back over a newer leader's
    /// checkpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the upsert fails.
    pub async fn upsert(&self, position: EventId) -> Result<Cursor> {
        let cursor = sqlx::query_as::<_, Cursor>(
            r"
            INSERT INTO event_cursors (id, position, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE
            SET position = GREATEST(event_cursors.position, EXCLUDED.position), updated_at = EXCLUDED.updated_at
            RETURNING id, position, updated_at
            ",
        )
        .bind(CURSOR_ROW_ID)
        .bind(position)
        .fetch_one(&*self.pool)
        .await?;

        Ok(cursor)
    }
}
