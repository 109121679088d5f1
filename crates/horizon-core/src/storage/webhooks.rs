//! Repository for registered webhooks.
//!
//! Webhook CRUD belongs to the management API; the pipeline only reads
//! webhooks, either all of them for worker reconciliation or the enabled
//! ones registered on a set of scopes for log generation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{ResourceScope, Webhook, WebhookId},
};

const SELECT_COLUMNS: &str = r"
    SELECT id, enabled, url, ssl_verify_enabled, secret, description, triggers,
           resource_type, resource_id, created_at, created_by, updated_at, updated_by
    FROM webhooks
";

/// Fields of a webhook to register.
#[derive(Debug, Clone)]
pub struct NewWebhook {
    /// Node the webhook is registered on.
    pub scope: ResourceScope,
    /// Receiver URL.
    pub url: String,
    /// Whether the webhook is active.
    pub enabled: bool,
    /// Whether TLS certificates are verified.
    pub ssl_verify_enabled: bool,
    /// Shared secret.
    pub secret: String,
    /// Free-form description.
    pub description: String,
    /// Subscribed event types.
    pub triggers: Vec<String>,
    /// Registering user.
    pub created_by: i64,
}

/// Repository for webhook database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Registers a webhook.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(&self, webhook: &NewWebhook) -> Result<Webhook> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r"
            INSERT INTO webhooks (
                enabled, url, ssl_verify_enabled, secret, description, triggers,
                resource_type, resource_id, created_by, updated_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING id, enabled, url, ssl_verify_enabled, secret, description, triggers,
                      resource_type, resource_id, created_at, created_by, updated_at, updated_by
            ",
        )
        .bind(webhook.enabled)
        .bind(&webhook.url)
        .bind(webhook.ssl_verify_enabled)
        .bind(&webhook.secret)
        .bind(&webhook.description)
        .bind(&webhook.triggers)
        .bind(&webhook.scope.resource_type)
        .bind(webhook.scope.resource_id)
        .bind(webhook.created_by)
        .fetch_one(&*self.pool)
        .await?;

        Ok(webhook)
    }

    /// Finds a webhook by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: WebhookId) -> Result<Option<Webhook>> {
        let webhook = sqlx::query_as::<_, Webhook>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(webhook)
    }

    /// Lists every webhook, enabled or not, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list_all(&self) -> Result<Vec<Webhook>> {
        let webhooks = sqlx::query_as::<_, Webhook>(&format!("{SELECT_COLUMNS} ORDER BY id ASC"))
            .fetch_all(&*self.pool)
            .await?;

        Ok(webhooks)
    }

    /// Lists enabled webhooks registered on any of `scopes` and created no
    /// later than `created_before`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list_enabled_by_scopes(
        &self,
        scopes: &[ResourceScope],
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Webhook>> {
        if scopes.is_empty() {
            return Ok(Vec::new());
        }
        let types: Vec<String> = scopes.iter().map(|s| s.resource_type.to_string()).collect();
        let ids: Vec<i64> = scopes.iter().map(|s| s.resource_id).collect();

        let webhooks = sqlx::query_as::<_, Webhook>(&format!(
            r"{SELECT_COLUMNS}
            WHERE enabled = TRUE
              AND created_at <= $3
              AND (resource_type, resource_id) IN (
                  SELECT * FROM UNNEST($1::TEXT[], $2::BIGINT[])
              )
            ORDER BY id ASC"
        ))
        .bind(&types)
        .bind(&ids)
        .bind(created_before)
        .fetch_all(&*self.pool)
        .await?;

        Ok(webhooks)
    }
}
