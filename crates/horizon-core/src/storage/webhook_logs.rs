//! Repository for webhook logs, the durable delivery jobs.
//!
//! A log is inserted `waiting` by the generator or a resend, moved to a
//! terminal status exactly once by its webhook's worker, and eventually
//! removed by the retention cleaner.

use std::sync::Arc;

use sqlx::{types::Json, Executor, PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{DeliveryOutcome, EventId, NewWebhookLog, WebhookId, WebhookLog, WebhookLogId},
};

const SELECT_COLUMNS: &str = r"
    SELECT id, webhook_id, event_id, url, request_headers, request_data,
           response_headers, response_body, status, error_message,
           created_at, created_by, updated_at
    FROM webhook_logs
";

/// Repository for webhook log database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a batch of waiting logs in one transaction.
    ///
    /// # Errors
    ///
    /// Returns error if any insert fails; nothing is stored in that case.
    pub async fn create_many(&self, logs: &[NewWebhookLog]) -> Result<Vec<WebhookLog>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(logs.len());
        for log in logs {
            created.push(self.create_in_tx(&mut tx, log).await?);
        }
        tx.commit().await?;
        Ok(created)
    }

    /// Inserts a single waiting log.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(&self, log: &NewWebhookLog) -> Result<WebhookLog> {
        self.create_impl(&*self.pool, log).await
    }

    /// Inserts a waiting log within a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        log: &NewWebhookLog,
    ) -> Result<WebhookLog> {
        self.create_impl(&mut **tx, log).await
    }

    async fn create_impl<'e, E>(&self, executor: E, log: &NewWebhookLog) -> Result<WebhookLog>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let log = sqlx::query_as::<_, WebhookLog>(
            r"
            INSERT INTO webhook_logs (
                webhook_id, event_id, url, request_headers, request_data, status, created_by
            ) VALUES ($1, $2, $3, $4, $5, 'waiting', $6)
            RETURNING id, webhook_id, event_id, url, request_headers, request_data,
                      response_headers, response_body, status, error_message,
                      created_at, created_by, updated_at
            ",
        )
        .bind(log.webhook_id)
        .bind(log.event_id)
        .bind(&log.url)
        .bind(Json(&log.request_headers))
        .bind(&log.request_data)
        .bind(log.created_by)
        .fetch_one(executor)
        .await?;

        Ok(log)
    }

    /// Finds a log by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: WebhookLogId) -> Result<Option<WebhookLog>> {
        let log = sqlx::query_as::<_, WebhookLog>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(log)
    }

    /// Lists the waiting logs of a webhook, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list_waiting(&self, webhook_id: WebhookId, limit: i64) -> Result<Vec<WebhookLog>> {
        let logs = sqlx::query_as::<_, WebhookLog>(&format!(
            "{SELECT_COLUMNS} WHERE webhook_id = $1 AND status = 'waiting' ORDER BY id ASC LIMIT $2"
        ))
        .bind(webhook_id)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(logs)
    }

    /// Records the outcome of a delivery attempt.
    ///
    /// Only a log that is still waiting is updated, so a terminal status is
    /// never overwritten. Returns whether a row changed.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn complete(&self, id: WebhookLogId, outcome: &DeliveryOutcome) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE webhook_logs
            SET status = $2,
                response_headers = $3,
                response_body = $4,
                error_message = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'waiting'
            ",
        )
        .bind(id)
        .bind(outcome.status)
        .bind(outcome.response_headers.as_ref().map(Json))
        .bind(&outcome.response_body)
        .bind(&outcome.error_message)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists logs matching any of the given (event, webhook) pairs.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_pairs(&self, pairs: &[(EventId, WebhookId)]) -> Result<Vec<WebhookLog>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let event_ids: Vec<i64> = pairs.iter().map(|(event, _)| event.0).collect();
        let webhook_ids: Vec<i64> = pairs.iter().map(|(_, webhook)| webhook.0).collect();

        let logs = sqlx::query_as::<_, WebhookLog>(&format!(
            r"{SELECT_COLUMNS}
            WHERE (event_id, webhook_id) IN (
                SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[])
            )
            ORDER BY id ASC"
        ))
        .bind(&event_ids)
        .bind(&webhook_ids)
        .fetch_all(&*self.pool)
        .await?;

        Ok(logs)
    }

    /// Returns the largest event id referenced by any log.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn max_event_id(&self) -> Result<Option<EventId>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(event_id) FROM webhook_logs")
            .fetch_one(&*self.pool)
            .await?;

        Ok(max.map(EventId))
    }

    /// Lists up to `limit` logs with id greater than `after`, ascending.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list_after(&self, after: WebhookLogId, limit: i64) -> Result<Vec<WebhookLog>> {
        let logs = sqlx::query_as::<_, WebhookLog>(&format!(
            "{SELECT_COLUMNS} WHERE id > $1 ORDER BY id ASC LIMIT $2"
        ))
        .bind(after)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(logs)
    }

    /// Deletes logs by id, returning the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete_by_ids(&self, ids: &[WebhookLogId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();

        let result = sqlx::query("DELETE FROM webhook_logs WHERE id = ANY($1)")
            .bind(&raw)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
