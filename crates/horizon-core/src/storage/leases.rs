//! Repository for time-bounded leader leases.
//!
//! A lease row names its holder and carries a fencing token. Acquisition
//! succeeds when no row exists, the existing row has expired, or the caller
//! already holds it.

use std::{sync::Arc, time::Duration};

use sqlx::PgPool;

use crate::error::Result;

/// Repository for lease database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Attempts to take the lease for `holder` with a fresh `token`.
    ///
    /// Returns `true` when the lease now belongs to `holder`.
    ///
    /// # Errors
    ///
    /// Returns error if the upsert fails.
    pub async fn try_acquire(
        &self,
        namespace: &str,
        name: &str,
        holder: &str,
        token: &str,
        duration: Duration,
    ) -> Result<bool> {
        let acquired: Option<String> = sqlx::query_scalar(
            r"
            INSERT INTO leader_leases (namespace, name, holder, token, acquired_at, expires_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW() + make_interval(secs => $5))
            ON CONFLICT (namespace, name) DO UPDATE
            SET holder = EXCLUDED.holder,
                token = EXCLUDED.token,
                acquired_at = EXCLUDED.acquired_at,
                expires_at = EXCLUDED.expires_at
            WHERE leader_leases.expires_at <= NOW()
               OR leader_leases.holder = EXCLUDED.holder
            RETURNING token
            ",
        )
        .bind(namespace)
        .bind(name)
        .bind(holder)
        .bind(token)
        .bind(duration.as_secs_f64())
        .fetch_optional(&*self.pool)
        .await?;

        Ok(acquired.is_some())
    }

    /// Extends an unexpired lease identified by its token.
    ///
    /// Returns `false` when the lease expired or was taken over.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn renew(&self, namespace: &str, name: &str, token: &str, duration: Duration) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE leader_leases
            SET expires_at = NOW() + make_interval(secs => $4)
            WHERE namespace = $1 AND name = $2 AND token = $3 AND expires_at > NOW()
            ",
        )
        .bind(namespace)
        .bind(name)
        .bind(token)
        .bind(duration.as_secs_f64())
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Gives up the lease identified by its token.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn release(&self, namespace: &str, name: &str, token: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM leader_leases WHERE namespace = $1 AND name = $2 AND token = $3",
        )
        .bind(namespace)
        .bind(name)
        .bind(token)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns the holder of an unexpired lease.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn current_holder(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        let holder = sqlx::query_scalar(
            r"
            SELECT holder FROM leader_leases
            WHERE namespace = $1 AND name = $2 AND expires_at > NOW()
            ",
        )
        .bind(namespace)
        .bind(name)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(holder)
    }
}
