//! Consumer handler turning events into waiting webhook logs.
//!
//! For every event the generator resolves the chain of resource nodes the
//! event belongs to, lists the enabled webhooks registered on any of them
//! and keeps those whose triggers match the event type. Each surviving
//! (event, webhook) pair becomes one waiting log with its URL, headers and
//! body snapshotted. All logs of one batch are inserted in one transaction.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use horizon_core::{
    models::{
        ApplicationSummary, ClusterSummary, Event, EventId, NewWebhookLog, ResourceScope,
        ResourceType, UserSummary, WebhookId, WebhookRequestBody,
    },
    Clock, ResourceDirectory, SYSTEM_USER_ID,
};
use horizon_events::EventHandler;
use tracing::{debug, info};

use crate::{error::Result, payload, storage::WebhookStorage};

/// Resource nodes an event belongs to, nearest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    /// Application the event resolved to.
    pub application: ApplicationSummary,
    /// Cluster the event resolved to, for cluster events.
    pub cluster: Option<ClusterSummary>,
    /// Scopes whose webhooks see the event, ending with the virtual root.
    pub scopes: Vec<ResourceScope>,
}

/// Handler materializing delivery jobs for matched webhooks.
pub struct WebhookLogGenerator {
    storage: Arc<dyn WebhookStorage>,
    directory: Arc<dyn ResourceDirectory>,
    clock: Arc<dyn Clock>,
}

impl WebhookLogGenerator {
    /// Creates a generator.
    pub fn new(storage: Arc<dyn WebhookStorage>, directory: Arc<dyn ResourceDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, directory, clock }
    }

    /// Builds, deduplicates when resuming, and inserts the logs for a batch.
    ///
    /// Returns the number of logs inserted.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Store` if a lookup or the insert fails; no log
    /// of the batch is stored in that case.
    pub async fn generate(&self, events: &[Event], resume: bool) -> Result<usize> {
        let mut logs = self.build_logs(events).await?;
        if resume {
            logs = self.drop_existing(logs).await?;
        }
        if logs.is_empty() {
            return Ok(0);
        }

        let created = self.storage.create_webhook_logs(&logs).await?;
        info!(count = created.len(), batch_size = events.len(), resume, "webhook logs created");
        Ok(created.len())
    }

    /// Builds the waiting logs for every matched (event, webhook) pair.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Store` if a lookup fails.
    pub async fn build_logs(&self, events: &[Event]) -> Result<Vec<NewWebhookLog>> {
        let mut resolver = Resolver::new(self.directory.as_ref());
        let now = self.clock.now_utc();
        let mut logs = Vec::new();

        for event in events {
            let Some(ownership) = resolver.ownership(event).await? else {
                continue;
            };

            let webhooks = self.storage.list_enabled_webhooks(&ownership.scopes, now).await?;
            let mut seen = HashSet::new();
            let matched: Vec<_> = webhooks
                .into_iter()
                .filter(|webhook| webhook.enabled && webhook.created_at <= now)
                .filter(|webhook| webhook.is_triggered_by(&event.event_type))
                .filter(|webhook| seen.insert(webhook.id))
                .collect();
            if matched.is_empty() {
                continue;
            }

            let user = resolver.user(event.created_by).await?;
            for webhook in matched {
                let body = WebhookRequestBody {
                    id: None,
                    event_id: event.id,
                    webhook_id: webhook.id,
                    application: Some(ownership.application.clone()),
                    cluster: ownership.cluster.clone(),
                    event_type: event.event_type.clone(),
                    user: user.clone(),
                    extra: event.extra.clone(),
                };
                logs.push(NewWebhookLog {
                    webhook_id: webhook.id,
                    event_id: event.id,
                    url: webhook.url.clone(),
                    request_headers: webhook.delivery_headers(),
                    request_data: payload::render(&body)?,
                    created_by: event.created_by,
                });
            }
        }

        Ok(logs)
    }

    async fn drop_existing(&self, logs: Vec<NewWebhookLog>) -> Result<Vec<NewWebhookLog>> {
        if logs.is_empty() {
            return Ok(logs);
        }
        let pairs: Vec<(EventId, WebhookId)> = logs.iter().map(|log| (log.event_id, log.webhook_id)).collect();
        let existing: HashSet<(EventId, WebhookId)> = self
            .storage
            .find_webhook_logs_by_pairs(&pairs)
            .await?
            .into_iter()
            .map(|log| (log.event_id, log.webhook_id))
            .collect();

        let before = logs.len();
        let remaining: Vec<NewWebhookLog> = logs
            .into_iter()
            .filter(|log| !existing.contains(&(log.event_id, log.webhook_id)))
            .collect();
        debug!(skipped = before - remaining.len(), "dropped webhook logs that already exist");
        Ok(remaining)
    }
}

#[async_trait]
impl EventHandler for WebhookLogGenerator {
    async fn process(&self, events: &[Event], resume: bool) -> anyhow::Result<()> {
        self.generate(events, resume).await?;
        Ok(())
    }
}

/// Per-batch lookup cache over the resource directory.
struct Resolver<'a> {
    directory: &'a dyn ResourceDirectory,
    ownership: HashMap<(ResourceType, i64), Option<Ownership>>,
    users: HashMap<i64, Option<UserSummary>>,
}

impl<'a> Resolver<'a> {
    fn new(directory: &'a dyn ResourceDirectory) -> Self {
        Self { directory, ownership: HashMap::new(), users: HashMap::new() }
    }

    async fn ownership(&mut self, event: &Event) -> Result<Option<Ownership>> {
        let key = (event.resource_type.clone(), event.resource_id);
        if let Some(cached) = self.ownership.get(&key) {
            return Ok(cached.clone());
        }

        let resolved = match event.resource_type {
            ResourceType::Cluster => self.cluster_ownership(event.resource_id).await?,
            ResourceType::Application => self.application_ownership(event.resource_id, None).await?,
            _ => {
                debug!(
                    event_id = %event.id,
                    resource_type = %event.resource_type,
                    "resource type has no webhook scope, skipping event"
                );
                None
            },
        };
        if resolved.is_none() {
            debug!(event_id = %event.id, resource_id = event.resource_id, "event owner not found, skipping");
        }

        self.ownership.insert(key, resolved.clone());
        Ok(resolved)
    }

    async fn cluster_ownership(&self, cluster_id: i64) -> Result<Option<Ownership>> {
        let Some(cluster) = self.directory.cluster(cluster_id).await? else {
            return Ok(None);
        };
        let application_id = cluster.application_id;
        self.application_ownership(application_id, Some(cluster)).await
    }

    async fn application_ownership(
        &self,
        application_id: i64,
        cluster: Option<ClusterSummary>,
    ) -> Result<Option<Ownership>> {
        let Some(application) = self.directory.application(application_id).await? else {
            return Ok(None);
        };
        let groups = self.directory.group_ancestors(application.group_id).await?;

        let mut scopes = Vec::with_capacity(groups.len() + 3);
        if let Some(cluster) = &cluster {
            scopes.push(ResourceScope::new(ResourceType::Cluster, cluster.id));
        }
        scopes.push(ResourceScope::new(ResourceType::Application, application.id));
        scopes.extend(groups.into_iter().map(ResourceScope::group));
        scopes.push(ResourceScope::root());

        Ok(Some(Ownership { application, cluster, scopes }))
    }

    async fn user(&mut self, user_id: i64) -> Result<Option<UserSummary>> {
        if user_id == SYSTEM_USER_ID {
            return Ok(None);
        }
        if let Some(cached) = self.users.get(&user_id) {
            return Ok(cached.clone());
        }
        let user = self.directory.user(user_id).await?;
        self.users.insert(user_id, user.clone());
        Ok(user)
    }
}
