//! Builders and sample values for pipeline tests.

use chrono::{DateTime, Utc};
use horizon_core::models::{
    ApplicationSummary, ClusterSummary, Event, EventId, NewEvent, ResourceType, UserSummary, Webhook,
    WebhookId, WILDCARD_TRIGGER,
};
use serde_json::{json, Value};

/// Application named `app-{id}` in `group_id`.
pub fn application(id: i64, group_id: i64) -> ApplicationSummary {
    ApplicationSummary { id, name: format!("app-{id}"), group_id, priority: "P2".to_string() }
}

/// Cluster named `cluster-{id}` owned by `application_id`.
pub fn cluster(id: i64, application_id: i64) -> ClusterSummary {
    ClusterSummary { id, name: format!("cluster-{id}"), application_id, env: "test".to_string() }
}

/// User named `user-{id}`.
pub fn user(id: i64) -> UserSummary {
    UserSummary {
        id,
        name: format!("user-{id}"),
        full_name: format!("User {id}"),
        email: format!("user-{id}@example.com"),
    }
}

/// Producer event about a cluster.
pub fn cluster_event(cluster_id: i64, event_type: &str) -> NewEvent {
    NewEvent::new(ResourceType::Cluster, cluster_id, event_type)
}

/// Producer event about an application.
pub fn application_event(application_id: i64, event_type: &str) -> NewEvent {
    NewEvent::new(ResourceType::Application, application_id, event_type)
}

/// Kubernetes Event payload carried in `extra`.
pub fn kubernetes_event_extra(kind: &str, name: &str, namespace: &str, reason: &str) -> Value {
    json!({
        "involvedObject": {
            "apiVersion": "v1",
            "kind": kind,
            "name": name,
            "namespace": namespace,
        },
        "reason": reason,
        "message": format!("{kind} {name} {reason}"),
    })
}

/// Stored event with a fixed id and creation time.
pub fn stored_event(id: i64, event_type: &str, created_at: DateTime<Utc>) -> Event {
    Event {
        id: EventId(id),
        resource_type: ResourceType::Cluster,
        resource_id: 1,
        event_type: event_type.to_string(),
        extra: None,
        req_id: format!("req-{id}"),
        created_by: 0,
        created_at,
    }
}

/// Builder for registered webhooks.
#[derive(Debug, Clone)]
pub struct WebhookBuilder {
    webhook: Webhook,
}

impl WebhookBuilder {
    /// Enabled wildcard webhook on the root scope posting to `url`.
    pub fn new(id: i64, url: impl Into<String>) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            webhook: Webhook {
                id: WebhookId(id),
                enabled: true,
                url: url.into(),
                ssl_verify_enabled: true,
                secret: format!("secret-{id}"),
                description: String::new(),
                triggers: vec![WILDCARD_TRIGGER.to_string()],
                resource_type: ResourceType::Group,
                resource_id: 0,
                created_at: epoch,
                created_by: 1,
                updated_at: epoch,
                updated_by: 1,
            },
        }
    }

    /// Registers the webhook on a group.
    #[must_use]
    pub fn on_group(self, id: i64) -> Self {
        self.on(ResourceType::Group, id)
    }

    /// Registers the webhook on an application.
    #[must_use]
    pub fn on_application(self, id: i64) -> Self {
        self.on(ResourceType::Application, id)
    }

    /// Registers the webhook on a cluster.
    #[must_use]
    pub fn on_cluster(self, id: i64) -> Self {
        self.on(ResourceType::Cluster, id)
    }

    fn on(mut self, resource_type: ResourceType, id: i64) -> Self {
        self.webhook.resource_type = resource_type;
        self.webhook.resource_id = id;
        self
    }

    /// Replaces the trigger list.
    #[must_use]
    pub fn triggers(mut self, triggers: &[&str]) -> Self {
        self.webhook.triggers = triggers.iter().map(ToString::to_string).collect();
        self
    }

    /// Disables the webhook.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.webhook.enabled = false;
        self
    }

    /// Sets the secret.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook.secret = secret.into();
        self
    }

    /// Turns TLS verification on or off.
    #[must_use]
    pub fn ssl_verify(mut self, enabled: bool) -> Self {
        self.webhook.ssl_verify_enabled = enabled;
        self
    }

    /// Sets the registration time.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.webhook.created_at = at;
        self
    }

    /// Sets the last configuration change time.
    #[must_use]
    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.webhook.updated_at = at;
        self
    }

    /// Returns the webhook.
    pub fn build(self) -> Webhook {
        self.webhook
    }
}
