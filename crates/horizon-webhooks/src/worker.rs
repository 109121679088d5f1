//! Per-webhook delivery worker.
//!
//! A worker owns exactly one webhook. It lists that webhook's waiting logs
//! in ascending id order, posts each one and records a terminal status.
//! Failures are written into the log and never retried here; a new attempt
//! only happens through an explicit resend.

use std::{sync::Arc, time::Duration};

use horizon_core::{
    models::{DeliveryOutcome, Webhook, WebhookId, WebhookLog, WebhookLogStatus},
    Clock,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{DeliveryClient, DeliveryRequest, DeliveryResponse},
    error::{DeliveryError, Result},
    payload,
    storage::WebhookStorage,
};

/// Polling behaviour shared by all workers.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Sleep when no log is waiting.
    pub poll_interval: Duration,
    /// Maximum waiting logs listed per pass.
    pub batch_size: i64,
    /// Sleep after a store failure.
    pub error_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Delivery loop bound to one webhook.
pub struct WebhookWorker {
    webhook_id: WebhookId,
    webhook: watch::Receiver<Webhook>,
    storage: Arc<dyn WebhookStorage>,
    client: Arc<DeliveryClient>,
    settings: WorkerSettings,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
}

impl WebhookWorker {
    /// Creates a worker reading its webhook configuration from `webhook`.
    pub fn new(
        webhook: watch::Receiver<Webhook>,
        storage: Arc<dyn WebhookStorage>,
        client: Arc<DeliveryClient>,
        settings: WorkerSettings,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let webhook_id = webhook.borrow().id;
        Self { webhook_id, webhook, storage, client, settings, clock, cancellation_token }
    }

    /// Delivers waiting logs until cancelled.
    ///
    /// Cancellation is observed between attempts, so an in-flight delivery
    /// always completes and is recorded.
    pub async fn run(&self) {
        info!(webhook_id = %self.webhook_id, "webhook worker starting");

        while !self.cancellation_token.is_cancelled() {
            let pause = match self.process_pending().await {
                Ok(0) => self.settings.poll_interval,
                Ok(_) => continue,
                Err(err) => {
                    error!(webhook_id = %self.webhook_id, error = %err, "webhook worker pass failed");
                    self.settings.error_backoff
                },
            };

            tokio::select! {
                () = self.clock.sleep(pause) => {},
                () = self.cancellation_token.cancelled() => break,
            }
        }

        info!(webhook_id = %self.webhook_id, "webhook worker stopped");
    }

    /// Runs one pass over the waiting logs and returns how many were
    /// attempted.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Store` if listing or recording fails.
    pub async fn process_pending(&self) -> Result<usize> {
        let logs = self.storage.list_waiting_logs(self.webhook_id, self.settings.batch_size).await?;
        if !logs.is_empty() {
            debug!(webhook_id = %self.webhook_id, batch_size = logs.len(), "delivering waiting logs");
        }

        let mut attempted = 0;
        for log in &logs {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            self.attempt(log).await?;
            attempted += 1;
        }
        Ok(attempted)
    }

    /// Whether the next attempt verifies the receiver's TLS certificate.
    pub fn ssl_verify_enabled(&self) -> bool {
        self.webhook.borrow().ssl_verify_enabled
    }

    /// Delivers one log and records the outcome.
    async fn attempt(&self, log: &WebhookLog) -> Result<WebhookLogStatus> {
        // Configuration swaps apply from the next attempt on.
        let ssl_verify = self.ssl_verify_enabled();

        let outcome = match self.send(log, ssl_verify).await {
            Ok(response) => outcome_for_response(response),
            Err(err) => DeliveryOutcome::failed(err.to_string()),
        };

        let recorded = self.storage.complete_webhook_log(log.id, &outcome).await?;
        if recorded {
            info!(
                webhook_id = %self.webhook_id,
                log_id = %log.id,
                event_id = %log.event_id,
                status = %outcome.status,
                error = outcome.error_message.as_deref().unwrap_or(""),
                "webhook log delivered"
            );
        } else {
            warn!(log_id = %log.id, "webhook log was no longer waiting, outcome discarded");
        }
        Ok(outcome.status)
    }

    async fn send(&self, log: &WebhookLog, ssl_verify: bool) -> Result<DeliveryResponse> {
        let body = payload::with_log_id(&log.request_data, log.id)?;
        let request = DeliveryRequest {
            log_id: log.id,
            webhook_id: log.webhook_id,
            event_id: log.event_id,
            url: log.url.clone(),
            headers: log.request_headers.0.clone(),
            body,
            ssl_verify,
        };
        self.client.deliver(request).await
    }
}

fn outcome_for_response(response: DeliveryResponse) -> DeliveryOutcome {
    if response.is_success {
        return DeliveryOutcome::success(response.headers, response.body);
    }
    let message = DeliveryError::http_status(response.status_code, response.body.clone()).to_string();
    DeliveryOutcome::failed(message).with_response(response.headers, response.body)
}
