//! Request-scoped values threaded explicitly through producer calls.
//!
//! Producers hand a `RequestContext` to the event store instead of relying
//! on ambient task-local state; background producers use
//! [`RequestContext::system`].

use uuid::Uuid;

use crate::models::UserSummary;

/// User id recorded for events produced by the platform itself.
pub const SYSTEM_USER_ID: i64 = 0;

/// Request id and acting user of the operation producing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: String,
    user: Option<UserSummary>,
}

impl RequestContext {
    /// Creates a context for a request made by `user`.
    ///
    /// An empty request id is replaced with a freshly generated one.
    pub fn new(request_id: impl Into<String>, user: Option<UserSummary>) -> Self {
        let request_id = request_id.into();
        let request_id = if request_id.is_empty() { generate_request_id() } else { request_id };
        Self { request_id, user }
    }

    /// Context for work initiated by the platform rather than a user.
    pub fn system() -> Self {
        Self { request_id: generate_request_id(), user: None }
    }

    /// Correlating request id.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Acting user, if any.
    pub fn user(&self) -> Option<&UserSummary> {
        self.user.as_ref()
    }

    /// Id recorded as creator of rows written on behalf of this context.
    pub fn user_id(&self) -> i64 {
        self.user.as_ref().map_or(SYSTEM_USER_ID, |user| user.id)
    }
}

fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}
