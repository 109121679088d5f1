//! Idempotent schema bootstrap.

use sqlx::PgPool;
use tracing::debug;

use crate::error::Result;

const STATEMENTS: &[(&str, &str)] = &[
    (
        "events",
        r"
        CREATE TABLE IF NOT EXISTS events (
            id BIGSERIAL PRIMARY KEY,
            resource_type TEXT NOT NULL,
            resource_id BIGINT NOT NULL,
            event_type TEXT NOT NULL,
            extra JSONB,
            req_id TEXT NOT NULL DEFAULT '',
            created_by BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    ),
    (
        "event_cursors",
        r"
        CREATE TABLE IF NOT EXISTS event_cursors (
            id BIGINT PRIMARY KEY,
            position BIGINT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    ),
    (
        "webhooks",
        r"
        CREATE TABLE IF NOT EXISTS webhooks (
            id BIGSERIAL PRIMARY KEY,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            url TEXT NOT NULL,
            ssl_verify_enabled BOOLEAN NOT NULL DEFAULT TRUE,
            secret TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            triggers TEXT[] NOT NULL DEFAULT '{}',
            resource_type TEXT NOT NULL,
            resource_id BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by BIGINT NOT NULL DEFAULT 0,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_by BIGINT NOT NULL DEFAULT 0
        )
        ",
    ),
    (
        "idx_webhooks_scope",
        r"
        CREATE INDEX IF NOT EXISTS idx_webhooks_scope
        ON webhooks(resource_type, resource_id)
        ",
    ),
    (
        "webhook_logs",
        r"
        CREATE TABLE IF NOT EXISTS webhook_logs (
            id BIGSERIAL PRIMARY KEY,
            webhook_id BIGINT NOT NULL,
            event_id BIGINT NOT NULL,
            url TEXT NOT NULL,
            request_headers JSONB NOT NULL,
            request_data TEXT NOT NULL,
            response_headers JSONB,
            response_body TEXT,
            status TEXT NOT NULL,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_by BIGINT NOT NULL DEFAULT 0,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    ),
    (
        "idx_webhook_logs_waiting",
        r"
        CREATE INDEX IF NOT EXISTS idx_webhook_logs_waiting
        ON webhook_logs(webhook_id, id)
        WHERE status = 'waiting'
        ",
    ),
    (
        "idx_webhook_logs_event",
        r"
        CREATE INDEX IF NOT EXISTS idx_webhook_logs_event
        ON webhook_logs(event_id, webhook_id)
        ",
    ),
    (
        "leader_leases",
        r"
        CREATE TABLE IF NOT EXISTS leader_leases (
            namespace TEXT NOT NULL,
            name TEXT NOT NULL,
            holder TEXT NOT NULL,
            token TEXT NOT NULL,
            acquired_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (namespace, name)
        )
        ",
    ),
];

/// Applies every schema statement in order.
///
/// # Errors
///
/// Returns `CoreError::Store` on the first failing statement.
pub async fn apply(pool: &PgPool) -> Result<()> {
    for (name, statement) in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
        debug!(object = name, "schema object ensured");
    }
    Ok(())
}
