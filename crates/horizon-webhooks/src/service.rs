//! Delivery service reconciling one worker per enabled webhook.
//!
//! The service owns the worker registry; no other task touches it. Every
//! reconcile tick lists all webhooks and diffs them against the registry:
//!
//! - an enabled webhook without a worker gets one
//! - a webhook whose `updated_at` changed has its configuration swapped in
//!   place through the worker's watch channel
//! - a worker whose webhook was removed or disabled is cancelled and awaited
//!   so its current attempt is recorded before it is dropped

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use horizon_core::{
    models::{Webhook, WebhookId},
    Clock,
};
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ClientConfig, DeliveryClient},
    error::{DeliveryError, Result},
    storage::WebhookStorage,
    worker::{WebhookWorker, WorkerSettings},
};

/// Configuration of the delivery service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Interval between reconcile passes.
    pub reconcile_interval: Duration,

    /// Worker sleep when no log is waiting.
    pub poll_interval: Duration,

    /// Maximum waiting logs a worker lists per pass.
    pub batch_size: i64,

    /// Sleep after a store failure.
    pub error_backoff: Duration,

    /// HTTP client configuration.
    pub client_config: ClientConfig,

    /// Maximum time to wait for workers to drain on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            error_backoff: Duration::from_secs(5),
            client_config: ClientConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl DeliveryConfig {
    fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: self.poll_interval,
            batch_size: self.batch_size,
            error_backoff: self.error_backoff,
        }
    }
}

/// Changes applied by one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Webhooks that got a new worker.
    pub started: Vec<WebhookId>,
    /// Webhooks whose worker received new configuration.
    pub updated: Vec<WebhookId>,
    /// Webhooks whose worker was stopped.
    pub stopped: Vec<WebhookId>,
}

impl ReconcileReport {
    /// Returns whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.updated.is_empty() && self.stopped.is_empty()
    }
}

struct WorkerEntry {
    config: watch::Sender<Webhook>,
    updated_at: DateTime<Utc>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Reconciling owner of the per-webhook workers.
pub struct DeliveryService {
    storage: Arc<dyn WebhookStorage>,
    client: Arc<DeliveryClient>,
    config: DeliveryConfig,
    clock: Arc<dyn Clock>,
    workers: HashMap<WebhookId, WorkerEntry>,
    cancellation_token: CancellationToken,
}

impl DeliveryService {
    /// Creates a service with no workers.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(storage: Arc<dyn WebhookStorage>, config: DeliveryConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Arc::new(DeliveryClient::new(config.client_config.clone())?);
        Ok(Self {
            storage,
            client,
            config,
            clock,
            workers: HashMap::new(),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Webhooks that currently have a worker, in id order.
    pub fn active_workers(&self) -> Vec<WebhookId> {
        let mut ids: Vec<WebhookId> = self.workers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Webhook configuration the worker of `id` uses on its next attempt.
    pub fn worker_config(&self, id: WebhookId) -> Option<Webhook> {
        self.workers.get(&id).map(|entry| entry.config.borrow().clone())
    }

    /// Reconciles until `token` is cancelled, then drains every worker.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShutdownTimeout` if workers do not drain in
    /// time. Reconcile failures are logged and retried on the next tick.
    pub async fn run(mut self, token: CancellationToken) -> Result<()> {
        info!(
            reconcile_interval_ms = self.config.reconcile_interval.as_millis(),
            "starting webhook delivery service"
        );

        loop {
            match self.reconcile().await {
                Ok(report) if !report.is_empty() => info!(
                    started = report.started.len(),
                    updated = report.updated.len(),
                    stopped = report.stopped.len(),
                    active = self.workers.len(),
                    "webhook workers reconciled"
                ),
                Ok(_) => {},
                Err(err) => error!(error = %err, "failed to reconcile webhook workers"),
            }

            tokio::select! {
                () = self.clock.sleep(self.config.reconcile_interval) => {},
                () = token.cancelled() => break,
            }
        }

        self.shutdown().await
    }

    /// Brings the worker registry in line with the stored webhooks.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Store` if webhooks cannot be listed; the
    /// registry is left untouched in that case.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport> {
        let webhooks = self.storage.list_webhooks().await?;
        let mut report = ReconcileReport::default();

        self.reap_finished();

        let enabled: HashMap<WebhookId, Webhook> = webhooks
            .into_iter()
            .filter(|webhook| webhook.enabled)
            .map(|webhook| (webhook.id, webhook))
            .collect();

        let stale: Vec<WebhookId> =
            self.workers.keys().filter(|id| !enabled.contains_key(id)).copied().collect();
        for id in stale {
            if let Some(entry) = self.workers.remove(&id) {
                self.stop_worker(id, entry).await;
                report.stopped.push(id);
            }
        }

        for (id, webhook) in enabled {
            match self.workers.get_mut(&id) {
                Some(entry) if entry.updated_at != webhook.updated_at => {
                    entry.updated_at = webhook.updated_at;
                    entry.config.send_replace(webhook);
                    debug!(webhook_id = %id, "webhook worker configuration swapped");
                    report.updated.push(id);
                },
                Some(_) => {},
                None => {
                    let entry = self.spawn_worker(webhook);
                    self.workers.insert(id, entry);
                    report.started.push(id);
                },
            }
        }

        report.started.sort_unstable();
        report.updated.sort_unstable();
        report.stopped.sort_unstable();
        Ok(report)
    }

    /// Cancels every worker and waits for all of them to finish.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShutdownTimeout` if the workers do not finish
    /// within the configured timeout.
    pub async fn shutdown(mut self) -> Result<()> {
        let timeout = self.config.shutdown_timeout;
        info!(workers = self.workers.len(), timeout_seconds = timeout.as_secs(), "stopping webhook workers");

        self.cancellation_token.cancel();
        let entries: Vec<(WebhookId, WorkerEntry)> = self.workers.drain().collect();

        let drain = async {
            let mut panicked = HashSet::new();
            for (id, entry) in entries {
                if let Err(err) = entry.handle.await {
                    error!(webhook_id = %id, error = %err, "webhook worker panicked during shutdown");
                    panicked.insert(id);
                }
            }
            panicked
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(panicked) => {
                if !panicked.is_empty() {
                    warn!(panicked = panicked.len(), "some webhook workers panicked");
                }
                info!("webhook delivery service stopped");
                Ok(())
            },
            Err(_elapsed) => {
                error!(timeout_seconds = timeout.as_secs(), "webhook worker shutdown timed out");
                Err(DeliveryError::ShutdownTimeout { timeout })
            },
        }
    }

    fn spawn_worker(&self, webhook: Webhook) -> WorkerEntry {
        let updated_at = webhook.updated_at;
        let (config, receiver) = watch::channel(webhook);
        let token = self.cancellation_token.child_token();

        let worker = WebhookWorker::new(
            receiver,
            self.storage.clone(),
            self.client.clone(),
            self.config.worker_settings(),
            self.clock.clone(),
            token.clone(),
        );
        let handle = tokio::spawn(async move { worker.run().await });

        WorkerEntry { config, updated_at, token, handle }
    }

    async fn stop_worker(&self, id: WebhookId, entry: WorkerEntry) {
        entry.token.cancel();
        match tokio::time::timeout(self.config.shutdown_timeout, entry.handle).await {
            Ok(Ok(())) => debug!(webhook_id = %id, "webhook worker stopped"),
            Ok(Err(err)) => {
                let err = DeliveryError::WorkerPanic { webhook_id: id, error: err.to_string() };
                error!(error = %err, "webhook worker ended abnormally");
            },
            Err(_elapsed) => warn!(webhook_id = %id, "webhook worker did not drain in time, detaching"),
        }
    }

    /// Drops registry entries whose task ended on its own so the next pass
    /// respawns them.
    fn reap_finished(&mut self) {
        self.workers.retain(|id, entry| {
            let finished = entry.handle.is_finished() && !entry.token.is_cancelled();
            if finished {
                warn!(webhook_id = %id, "webhook worker exited unexpectedly, respawning");
            }
            !finished
        });
    }
}

impl Drop for DeliveryService {
    fn drop(&mut self) {
        let active = self.workers.values().filter(|entry| !entry.handle.is_finished()).count();
        if active > 0 && !self.cancellation_token.is_cancelled() {
            error!(active_workers = active, "delivery service dropped with running workers, cancelling them");
            self.cancellation_token.cancel();
        }
    }
}
