//! Core domain models and strongly-typed identifiers.
//!
//! Defines the immutable event log entry, the consumer cursor, registered
//! webhooks and the webhook log rows that act as delivery jobs. Newtype ID
//! wrappers keep event, webhook and log ids from being mixed up, and the
//! status enum carries the waiting -> success/failed transition rules.

use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Header carrying the webhook secret on every delivery.
pub const SECRET_HEADER: &str = "X-Horizon-Webhook-Secret";

/// Content type sent with every delivery.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

/// Trigger that subscribes a webhook to every event type.
pub const WILDCARD_TRIGGER: &str = "*";

/// Group id of the virtual root scope that sits above every top-level group.
pub const ROOT_GROUP_ID: i64 = 0;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl sqlx::Type<PgDb> for $name {
            fn type_info() -> PgTypeInfo {
                <i64 as sqlx::Type<PgDb>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, PgDb> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                Ok(Self(<i64 as sqlx::Decode<PgDb>>::decode(value)?))
            }
        }

        impl sqlx::Encode<'_, PgDb> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
                <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

id_newtype!(
    /// Monotonic event identifier assigned by the event log.
    ///
    /// Event ids define the only total order in the pipeline; the consumer
    /// cursor and the resume high-water mark are both expressed in them.
    EventId
);

id_newtype!(
    /// Identifier of a registered webhook.
    WebhookId
);

id_newtype!(
    /// Identifier of a webhook log row (one delivery job).
    WebhookLogId
);

/// Kind of resource an event or webhook scope refers to.
///
/// Unknown kinds are kept verbatim so events from newer producers are still
/// readable; the log generator simply skips them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ResourceType {
    /// A group node in the hierarchy.
    Group,
    /// An application owned by a group.
    Application,
    /// A cluster owned by an application.
    Cluster,
    /// A pipeline run of a cluster.
    PipelineRun,
    /// Any other resource kind.
    Other(String),
}

impl ResourceType {
    /// Returns the wire and storage name of the resource type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Group => "groups",
            Self::Application => "applications",
            Self::Cluster => "clusters",
            Self::PipelineRun => "pipelineruns",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        match value {
            "groups" => Self::Group,
            "applications" => Self::Application,
            "clusters" => Self::Cluster,
            "pipelineruns" => Self::PipelineRun,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ResourceType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.as_str().to_string()
    }
}

impl sqlx::Type<PgDb> for ResourceType {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ResourceType {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        Ok(Self::from(<&str as sqlx::Decode<PgDb>>::decode(value)?))
    }
}

impl sqlx::Encode<'_, PgDb> for ResourceType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Known event type names emitted by producers.
pub mod event_types {
    /// An application was created.
    pub const APPLICATIONS_CREATED: &str = "applications_created";
    /// An application was deleted.
    pub const APPLICATIONS_DELETED: &str = "applications_deleted";
    /// An application moved to another group.
    pub const APPLICATIONS_TRANSFERRED: &str = "applications_transferred";
    /// A cluster was created.
    pub const CLUSTERS_CREATED: &str = "clusters_created";
    /// A cluster was deleted.
    pub const CLUSTERS_DELETED: &str = "clusters_deleted";
    /// A cluster was built and deployed.
    pub const CLUSTERS_BUILD_DEPLOYED: &str = "clusters_builddeployed";
    /// A cluster was deployed.
    pub const CLUSTERS_DEPLOYED: &str = "clusters_deployed";
    /// A cluster was rolled back.
    pub const CLUSTERS_ROLLBACKED: &str = "clusters_rollbacked";
    /// A cluster's resources were freed.
    pub const CLUSTERS_FREED: &str = "clusters_freed";
    /// A Kubernetes event was observed for a cluster's workload.
    pub const CLUSTERS_KUBERNETES_EVENT: &str = "clusters_kubernetes_event";
    /// A pipeline run was created.
    pub const PIPELINERUNS_CREATED: &str = "pipelineruns_created";

    /// Every event type a webhook may subscribe to.
    pub const ALL: &[&str] = &[
        APPLICATIONS_CREATED,
        APPLICATIONS_DELETED,
        APPLICATIONS_TRANSFERRED,
        CLUSTERS_CREATED,
        CLUSTERS_DELETED,
        CLUSTERS_BUILD_DEPLOYED,
        CLUSTERS_DEPLOYED,
        CLUSTERS_ROLLBACKED,
        CLUSTERS_FREED,
        CLUSTERS_KUBERNETES_EVENT,
        PIPELINERUNS_CREATED,
    ];
}

/// Immutable record of a resource lifecycle occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    /// Monotonic id assigned on append.
    pub id: EventId,
    /// Kind of the resource the event is about.
    pub resource_type: ResourceType,
    /// Id of the resource the event is about.
    pub resource_id: i64,
    /// Event type name, see [`event_types`].
    pub event_type: String,
    /// Optional free-form payload supplied by the producer.
    pub extra: Option<serde_json::Value>,
    /// Request id correlating the event with the request that caused it.
    pub req_id: String,
    /// Id of the acting user.
    pub created_by: i64,
    /// When the event was appended.
    pub created_at: DateTime<Utc>,
}

/// Event as supplied by a producer, before the log assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Kind of the resource the event is about.
    pub resource_type: ResourceType,
    /// Id of the resource the event is about.
    pub resource_id: i64,
    /// Event type name.
    pub event_type: String,
    /// Optional free-form payload.
    pub extra: Option<serde_json::Value>,
    /// Correlating request id; filled from the request context when absent.
    pub req_id: Option<String>,
}

impl NewEvent {
    /// Creates a new event without payload or request id.
    pub fn new(
        resource_type: ResourceType,
        resource_id: i64,
        event_type: impl Into<String>,
    ) -> Self {
        Self { resource_type, resource_id, event_type: event_type.into(), extra: None, req_id: None }
    }

    /// Attaches a free-form payload.
    #[must_use]
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Singleton record of the last event id fully processed by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cursor {
    /// Row id of the singleton.
    pub id: i64,
    /// Last processed event id; zero on a fresh start.
    pub position: EventId,
    /// When the position was last persisted.
    pub updated_at: DateTime<Utc>,
}

/// A node of the resource hierarchy a webhook can be registered on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceScope {
    /// Kind of the node.
    pub resource_type: ResourceType,
    /// Id of the node.
    pub resource_id: i64,
}

impl ResourceScope {
    /// Creates a scope for a resource node.
    pub fn new(resource_type: ResourceType, resource_id: i64) -> Self {
        Self { resource_type, resource_id }
    }

    /// Scope of a group node.
    pub fn group(id: i64) -> Self {
        Self::new(ResourceType::Group, id)
    }

    /// Scope of the virtual root above every top-level group.
    pub fn root() -> Self {
        Self::group(ROOT_GROUP_ID)
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.resource_id)
    }
}

/// Externally registered HTTP endpoint subscribed to event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Webhook {
    /// Unique identifier.
    pub id: WebhookId,
    /// Disabled webhooks neither match events nor run a worker.
    pub enabled: bool,
    /// Receiver URL.
    pub url: String,
    /// Whether the receiver's TLS certificate is verified.
    pub ssl_verify_enabled: bool,
    /// Secret sent in [`SECRET_HEADER`].
    pub secret: String,
    /// Free-form description.
    pub description: String,
    /// Subscribed event types, in registration order; may contain `*`.
    pub triggers: Vec<String>,
    /// Kind of the node the webhook is registered on.
    pub resource_type: ResourceType,
    /// Id of the node the webhook is registered on.
    pub resource_id: i64,
    /// When the webhook was registered.
    pub created_at: DateTime<Utc>,
    /// Registering user.
    pub created_by: i64,
    /// Last configuration change.
    pub updated_at: DateTime<Utc>,
    /// User that made the last change.
    pub updated_by: i64,
}

impl Webhook {
    /// Returns whether the trigger list subscribes to the event type.
    pub fn is_triggered_by(&self, event_type: &str) -> bool {
        self.triggers.iter().any(|trigger| trigger == WILDCARD_TRIGGER || trigger == event_type)
    }

    /// Returns the node the webhook is registered on.
    pub fn scope(&self) -> ResourceScope {
        ResourceScope::new(self.resource_type.clone(), self.resource_id)
    }

    /// Headers snapshotted into every delivery job created for this webhook.
    pub fn delivery_headers(&self) -> HashMap<String, String> {
        HashMap::from([
            (SECRET_HEADER.to_string(), self.secret.clone()),
            ("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()),
        ])
    }
}

/// Lifecycle state of a delivery job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookLogStatus {
    /// Created and not yet attempted.
    Waiting,
    /// Receiver answered with a 2xx status. Terminal.
    Success,
    /// Attempt failed. Terminal; only a resend creates a new attempt.
    Failed,
}

impl WebhookLogStatus {
    /// Returns the storage name of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Returns whether no further transition is allowed.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Waiting)
    }

    /// Returns whether moving to `next` is a legal transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!((self, next), (Self::Waiting, Self::Success | Self::Failed))
    }
}

impl fmt::Display for WebhookLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookLogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid webhook log status: {s}")),
        }
    }
}

impl sqlx::Type<PgDb> for WebhookLogStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for WebhookLogStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(s.parse()?)
    }
}

impl sqlx::Encode<'_, PgDb> for WebhookLogStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// One delivery job for one (event, webhook) pair.
///
/// URL, headers and body are snapshotted when the row is created, so later
/// webhook edits never change what an in-flight job sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookLog {
    /// Unique identifier.
    pub id: WebhookLogId,
    /// Webhook the job belongs to.
    pub webhook_id: WebhookId,
    /// Event the job delivers.
    pub event_id: EventId,
    /// Snapshotted receiver URL.
    pub url: String,
    /// Snapshotted request headers.
    pub request_headers: Json<HashMap<String, String>>,
    /// Snapshotted JSON request body, without the log id.
    pub request_data: String,
    /// Headers returned by the receiver.
    pub response_headers: Option<Json<HashMap<String, String>>>,
    /// Body returned by the receiver.
    pub response_body: Option<String>,
    /// Current lifecycle state.
    pub status: WebhookLogStatus,
    /// Human-readable failure reason for failed jobs.
    pub error_message: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// User on whose behalf the job was created.
    pub created_by: i64,
    /// When the job last changed.
    pub updated_at: DateTime<Utc>,
}

impl WebhookLog {
    /// Builds the waiting clone inserted by a manual resend.
    ///
    /// Only the static request fields are copied; response data and error
    /// message start empty.
    pub fn to_resend(&self, created_by: i64) -> NewWebhookLog {
        NewWebhookLog {
            webhook_id: self.webhook_id,
            event_id: self.event_id,
            url: self.url.clone(),
            request_headers: self.request_headers.0.clone(),
            request_data: self.request_data.clone(),
            created_by,
        }
    }
}

/// Delivery job ready to be inserted with status `waiting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWebhookLog {
    /// Webhook the job belongs to.
    pub webhook_id: WebhookId,
    /// Event the job delivers.
    pub event_id: EventId,
    /// Receiver URL snapshot.
    pub url: String,
    /// Request header snapshot.
    pub request_headers: HashMap<String, String>,
    /// JSON request body snapshot.
    pub request_data: String,
    /// User on whose behalf the job is created.
    pub created_by: i64,
}

/// Recorded result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Terminal status to record.
    pub status: WebhookLogStatus,
    /// Headers returned by the receiver, if it answered.
    pub response_headers: Option<HashMap<String, String>>,
    /// Body returned by the receiver, if it answered.
    pub response_body: Option<String>,
    /// Failure reason for failed attempts.
    pub error_message: Option<String>,
}

impl DeliveryOutcome {
    /// Successful delivery with the receiver's response.
    pub fn success(headers: HashMap<String, String>, body: String) -> Self {
        Self {
            status: WebhookLogStatus::Success,
            response_headers: Some(headers),
            response_body: Some(body),
            error_message: None,
        }
    }

    /// Failed delivery with a human-readable reason.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: WebhookLogStatus::Failed,
            response_headers: None,
            response_body: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Attaches the receiver's response to a failed outcome.
    #[must_use]
    pub fn with_response(mut self, headers: HashMap<String, String>, body: String) -> Self {
        self.response_headers = Some(headers);
        self.response_body = Some(body);
        self
    }
}

/// Acting user as rendered into webhook payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// User id.
    pub id: i64,
    /// Login name.
    pub name: String,
    /// Display name.
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
}

/// Application as rendered into webhook payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSummary {
    /// Application id.
    pub id: i64,
    /// Application name.
    pub name: String,
    /// Group that owns the application.
    #[serde(rename = "groupID")]
    pub group_id: i64,
    /// Application priority.
    #[serde(default)]
    pub priority: String,
}

/// Cluster as rendered into webhook payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Cluster id.
    pub id: i64,
    /// Cluster name.
    pub name: String,
    /// Application that owns the cluster.
    #[serde(rename = "applicationID")]
    pub application_id: i64,
    /// Environment the cluster runs in.
    #[serde(default)]
    pub env: String,
}

/// JSON body delivered to webhook receivers.
///
/// The log id is absent when the body is snapshotted and injected by the
/// worker right before sending, so receivers can correlate deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequestBody {
    /// Webhook log id, injected at send time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<WebhookLogId>,
    /// Event being delivered.
    #[serde(rename = "eventID")]
    pub event_id: EventId,
    /// Webhook the delivery belongs to.
    #[serde(rename = "webhookID")]
    pub webhook_id: WebhookId,
    /// Application the event resolved to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationSummary>,
    /// Cluster the event resolved to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterSummary>,
    /// Event type name.
    #[serde(rename = "eventType")]
    pub event_type: String,
    /// Acting user.
    pub user: Option<UserSummary>,
    /// Producer payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use super::*;

    fn webhook_with_triggers(triggers: &[&str]) -> Webhook {
        Webhook {
            id: WebhookId(1),
            enabled: true,
            url: "https://example.com/hook".to_string(),
            ssl_verify_enabled: true,
            secret: "s3cret".to_string(),
            description: String::new(),
            triggers: triggers.iter().map(ToString::to_string).collect(),
            resource_type: ResourceType::Cluster,
            resource_id: 5,
            created_at: Utc::now(),
            created_by: 1,
            updated_at: Utc::now(),
            updated_by: 1,
        }
    }

    #[test]
    fn status_transitions_only_leave_waiting() {
        use WebhookLogStatus::{Failed, Success, Waiting};

        assert!(Waiting.can_transition_to(Success));
        assert!(Waiting.can_transition_to(Failed));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Success));
        assert!(!Success.can_transition_to(Waiting));
        assert!(!Failed.can_transition_to(Waiting));
        assert!(!Waiting.is_terminal());
        assert!(Success.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn status_round_trips_through_its_name() {
        for status in
            [WebhookLogStatus::Waiting, WebhookLogStatus::Success, WebhookLogStatus::Failed]
        {
            assert_eq!(status.as_str().parse::<WebhookLogStatus>(), Ok(status));
        }
        assert!("delivered".parse::<WebhookLogStatus>().is_err());
    }

    #[test]
    fn unknown_resource_types_are_preserved() {
        assert_eq!(ResourceType::from("clusters"), ResourceType::Cluster);
        let other = ResourceType::from("templates");
        assert_eq!(other, ResourceType::Other("templates".to_string()));
        assert_eq!(other.to_string(), "templates");
    }

    #[test]
    fn wildcard_trigger_matches_known_types() {
        let webhook = webhook_with_triggers(&["*"]);
        for event_type in event_types::ALL {
            assert!(webhook.is_triggered_by(event_type));
        }
    }

    #[test]
    fn specific_trigger_matches_only_its_type() {
        let webhook = webhook_with_triggers(&[event_types::CLUSTERS_CREATED]);
        assert!(webhook.is_triggered_by(event_types::CLUSTERS_CREATED));
        assert!(!webhook.is_triggered_by(event_types::CLUSTERS_DELETED));
        assert!(!webhook.is_triggered_by("*"));
    }

    #[test]
    fn delivery_headers_carry_secret_and_content_type() {
        let headers = webhook_with_triggers(&["*"]).delivery_headers();
        assert_eq!(headers.get(SECRET_HEADER).map(String::as_str), Some("s3cret"));
        assert_eq!(headers.get("Content-Type").map(String::as_str), Some(JSON_CONTENT_TYPE));
    }

    #[test]
    fn resend_copies_only_static_fields() {
        let log = WebhookLog {
            id: WebhookLogId(9),
            webhook_id: WebhookId(2),
            event_id: EventId(3),
            url: "https://example.com/hook".to_string(),
            request_headers: Json(HashMap::from([("a".to_string(), "b".to_string())])),
            request_data: "{}".to_string(),
            response_headers: Some(Json(HashMap::new())),
            response_body: Some("nope".to_string()),
            status: WebhookLogStatus::Failed,
            error_message: Some("boom".to_string()),
            created_at: Utc::now(),
            created_by: 1,
            updated_at: Utc::now(),
        };

        let clone = log.to_resend(7);
        assert_eq!(clone.webhook_id, log.webhook_id);
        assert_eq!(clone.event_id, log.event_id);
        assert_eq!(clone.url, log.url);
        assert_eq!(clone.request_headers, log.request_headers.0);
        assert_eq!(clone.request_data, log.request_data);
        assert_eq!(clone.created_by, 7);
    }

    #[test]
    fn request_body_uses_receiver_field_names() {
        let body = WebhookRequestBody {
            id: Some(WebhookLogId(11)),
            event_id: EventId(3),
            webhook_id: WebhookId(2),
            application: None,
            cluster: None,
            event_type: event_types::CLUSTERS_CREATED.to_string(),
            user: None,
            extra: None,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["id"], 11);
        assert_eq!(value["eventID"], 3);
        assert_eq!(value["webhookID"], 2);
        assert_eq!(value["eventType"], "clusters_created");
        assert!(value.get("application").is_none());
        assert!(value.get("extra").is_none());
    }

    proptest! {
        #[test]
        fn trigger_matching_is_membership_or_wildcard(
            triggers in proptest::collection::vec("[a-z_]{1,12}", 0..5),
            event_type in "[a-z_]{1,12}",
        ) {
            let refs: Vec<&str> = triggers.iter().map(String::as_str).collect();
            let webhook = webhook_with_triggers(&refs);
            let expected = triggers.iter().any(|t| t == &event_type);
            prop_assert_eq!(webhook.is_triggered_by(&event_type), expected);
        }
    }
}
