//! Wiring of the consumer, delivery and retention loops into one service.
//!
//! Every replica runs the delivery service and, when enabled, the retention
//! cleaner. The event consumer only runs on the replica holding the lease;
//! a fresh consumer is built for every leadership term so it always boots
//! from the persisted cursor.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use horizon_cleaner::{CleanerConfig, PostgresRetentionStorage, RetentionCleaner, RetentionStorage};
use horizon_core::{Clock, ResourceDirectory, Storage};
use horizon_events::{
    ConsumerConfig, EventConsumer, EventStorage, LeaderCallbacks, LeaderElection, LeaderElector, LeaseConfig,
    PostgresEventStorage, PostgresLeaderElector,
};
use horizon_webhooks::{
    DeliveryConfig, DeliveryService, LogHighWaterMark, PostgresWebhookStorage, WebhookLogGenerator, WebhookStorage,
    GENERATOR_HANDLER_NAME,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Storage and coordination backends the pipeline runs against.
#[derive(Clone)]
pub struct Backends {
    /// Event log and cursor.
    pub events: Arc<dyn EventStorage>,
    /// Webhooks and webhook logs.
    pub webhooks: Arc<dyn WebhookStorage>,
    /// Scans and deletes for retention.
    pub retention: Arc<dyn RetentionStorage>,
    /// Resource hierarchy lookups.
    pub directory: Arc<dyn ResourceDirectory>,
    /// Lease store for the consumer election.
    pub elector: Arc<dyn LeaderElector>,
}

impl Backends {
    /// PostgreSQL-backed adapters over one shared [`Storage`].
    pub fn postgres(storage: Arc<Storage>, lease: &LeaseConfig, lease_namespace: &str) -> Self {
        Self {
            events: Arc::new(PostgresEventStorage::new(storage.clone())),
            webhooks: Arc::new(PostgresWebhookStorage::new(storage.clone())),
            retention: Arc::new(PostgresRetentionStorage::new(storage.clone())),
            directory: storage.directory.clone(),
            elector: Arc::new(PostgresLeaderElector::new(storage, lease_namespace, lease.lease_duration)),
        }
    }
}

/// Settings of every pipeline loop.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Consumer loop tuning.
    pub consumer: ConsumerConfig,
    /// Consumer election lease.
    pub lease: LeaseConfig,
    /// Delivery service tuning.
    pub delivery: DeliveryConfig,
    /// Retention cleaner, `None` when disabled.
    pub cleaner: Option<CleanerConfig>,
}

/// Leader callbacks running the event consumer with the log generator.
pub struct ConsumerLeader {
    backends: Backends,
    config: ConsumerConfig,
    clock: Arc<dyn Clock>,
}

impl ConsumerLeader {
    /// Creates callbacks building consumers from `backends`.
    pub fn new(backends: Backends, config: ConsumerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { backends, config, clock }
    }

    /// Builds a consumer with the webhook log generator registered and the
    /// log high-water mark as resume marker.
    pub fn build_consumer(&self) -> Result<EventConsumer> {
        let generator = WebhookLogGenerator::new(
            self.backends.webhooks.clone(),
            self.backends.directory.clone(),
            self.clock.clone(),
        );
        let mut consumer = EventConsumer::new(self.backends.events.clone(), self.config.clone(), self.clock.clone())
            .with_resume_marker(Arc::new(LogHighWaterMark::new(self.backends.webhooks.clone())));
        consumer.register_handler(GENERATOR_HANDLER_NAME, Arc::new(generator))?;
        Ok(consumer)
    }
}

#[async_trait]
impl LeaderCallbacks for ConsumerLeader {
    async fn on_started_leading(&self, token: CancellationToken) {
        info!("became consumer leader, starting event consumer");
        let consumer = match self.build_consumer() {
            Ok(consumer) => consumer,
            Err(err) => {
                error!(error = %err, "failed to build event consumer");
                token.cancelled().await;
                return;
            },
        };
        if let Err(err) = consumer.run(token).await {
            error!(error = %err, "event consumer stopped with error");
        }
    }

    async fn on_stopped_leading(&self) {
        info!("no longer consumer leader");
    }
}

/// Runs every pipeline loop until `shutdown` is cancelled, then waits for
/// all of them to finish.
///
/// # Errors
///
/// Returns an error if a loop cannot be constructed, or if a loop failed or
/// panicked while shutting down.
pub async fn run(backends: Backends, settings: Settings, clock: Arc<dyn Clock>, shutdown: CancellationToken) -> Result<()> {
    let delivery = DeliveryService::new(backends.webhooks.clone(), settings.delivery, clock.clone())
        .context("failed to create delivery service")?;
    let cleaner = settings
        .cleaner
        .map(|config| RetentionCleaner::new(backends.retention.clone(), config, clock.clone()))
        .transpose()
        .context("failed to create retention cleaner")?;

    let election = LeaderElection::new(backends.elector.clone(), settings.lease, clock.clone());
    let callbacks = Arc::new(ConsumerLeader::new(backends, settings.consumer, clock));

    let election_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { election.run(callbacks, shutdown).await }
    });
    let delivery_handle = tokio::spawn(delivery.run(shutdown.clone()));
    let cleaner_handle = cleaner.map(|cleaner| {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { cleaner.run(shutdown).await })
    });
    if cleaner_handle.is_none() {
        info!("retention cleaner disabled");
    }

    info!("horizon pipeline running");
    shutdown.cancelled().await;
    info!("stopping horizon pipeline");

    let mut failed = false;
    match election_handle.await {
        Ok(Ok(())) => {},
        Ok(Err(err)) => {
            error!(error = %err, "leader election stopped with error");
            failed = true;
        },
        Err(err) => {
            error!(error = %err, "leader election task panicked");
            failed = true;
        },
    }
    match delivery_handle.await {
        Ok(Ok(())) => {},
        Ok(Err(err)) => {
            error!(error = %err, "delivery service stopped with error");
            failed = true;
        },
        Err(err) => {
            error!(error = %err, "delivery service task panicked");
            failed = true;
        },
    }
    if let Some(handle) = cleaner_handle {
        if let Err(err) = handle.await {
            warn!(error = %err, "retention cleaner task panicked");
            failed = true;
        }
    }

    if failed {
        anyhow::bail!("horizon pipeline did not shut down cleanly");
    }
    info!("horizon pipeline stopped");
    Ok(())
}
