//! Manual redelivery of a webhook log.
//!
//! Workers never retry. Resending inserts a new waiting log that copies the
//! source log's URL, headers and body; the source log is left as it is and
//! the webhook's worker picks the clone up on its next pass.

use std::sync::Arc;

use horizon_core::{
    models::{WebhookLog, WebhookLogId},
    RequestContext,
};
use tracing::info;

use crate::{
    error::{DeliveryError, Result},
    storage::WebhookStorage,
};

/// Read and resend access to webhook logs.
#[derive(Clone)]
pub struct WebhookLogService {
    storage: Arc<dyn WebhookStorage>,
}

impl WebhookLogService {
    /// Creates the service over `storage`.
    pub fn new(storage: Arc<dyn WebhookStorage>) -> Self {
        Self { storage }
    }

    /// Fetches one log.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::NotFound` if no log has that id.
    pub async fn get(&self, id: WebhookLogId) -> Result<WebhookLog> {
        self.storage
            .find_webhook_log(id)
            .await?
            .ok_or_else(|| DeliveryError::not_found("webhook log", id.0))
    }

    /// Queues a new attempt of the log `id` on behalf of `ctx`'s user.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::NotFound` if the source log does not exist
    /// and `DeliveryError::Store` if the insert fails.
    pub async fn resend(&self, ctx: &RequestContext, id: WebhookLogId) -> Result<WebhookLog> {
        let source = self.get(id).await?;
        let created = self.storage.create_webhook_log(&source.to_resend(ctx.user_id())).await?;

        info!(
            request_id = %ctx.request_id(),
            source_log_id = %source.id,
            log_id = %created.id,
            webhook_id = %created.webhook_id,
            "webhook log resent"
        );
        Ok(created)
    }
}
