//! Read-only lookups into the platform's resource tables.
//!
//! `groups`, `applications`, `clusters` and `users` are owned by the
//! management service sharing the database; the pipeline never writes them
//! and does not create them. Soft-deleted rows are treated as missing.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    directory::ResourceDirectory,
    error::Result,
    models::{ApplicationSummary, ClusterSummary, UserSummary},
};

/// Group chains deeper than this are assumed to be corrupt.
const MAX_GROUP_DEPTH: i32 = 64;

/// Repository resolving the resource hierarchy from PostgreSQL.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceDirectory for Repository {
    async fn application(&self, id: i64) -> Result<Option<ApplicationSummary>> {
        let row: Option<(i64, String, i64, String)> = sqlx::query_as(
            r"
            SELECT id, name, group_id, priority
            FROM applications
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|(id, name, group_id, priority)| ApplicationSummary { id, name, group_id, priority }))
    }

    async fn cluster(&self, id: i64) -> Result<Option<ClusterSummary>> {
        let row: Option<(i64, String, i64, String)> = sqlx::query_as(
            r"
            SELECT id, name, application_id, environment_name
            FROM clusters
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|(id, name, application_id, env)| ClusterSummary { id, name, application_id, env }))
    }

    async fn group_ancestors(&self, group_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r"
            WITH RECURSIVE chain (id, parent_id, depth) AS (
                SELECT id, parent_id, 0
                FROM groups
                WHERE id = $1 AND deleted_at IS NULL
                UNION ALL
                SELECT g.id, g.parent_id, chain.depth + 1
                FROM groups g
                JOIN chain ON g.id = chain.parent_id
                WHERE g.deleted_at IS NULL AND chain.depth < $2
            )
            SELECT id FROM chain WHERE id <> 0 ORDER BY depth ASC
            ",
        )
        .bind(group_id)
        .bind(MAX_GROUP_DEPTH)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn user(&self, id: i64) -> Result<Option<UserSummary>> {
        let row: Option<(i64, String, String, String)> = sqlx::query_as(
            r"
            SELECT id, name, full_name, email
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|(id, name, full_name, email)| UserSummary { id, name, full_name, email }))
    }
}
