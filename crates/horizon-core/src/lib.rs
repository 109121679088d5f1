//! Shared domain types and persistence for the horizon notification pipeline.
//!
//! Provides the event, webhook and webhook log models, the PostgreSQL
//! repositories backing them, request context, the resource directory seam
//! and the clock abstraction used by every polling loop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod directory;
pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use context::{RequestContext, SYSTEM_USER_ID};
pub use directory::ResourceDirectory;
pub use error::{CoreError, Result};
pub use models::{
    event_types, ApplicationSummary, ClusterSummary, Cursor, DeliveryOutcome, Event, EventId,
    NewEvent, NewWebhookLog, ResourceScope, ResourceType, UserSummary, Webhook, WebhookId,
    WebhookLog, WebhookLogId, WebhookLogStatus, WebhookRequestBody, JSON_CONTENT_TYPE,
    ROOT_GROUP_ID, SECRET_HEADER, WILDCARD_TRIGGER,
};
pub use storage::Storage;
pub use time::{Clock, RealClock, TestClock};
