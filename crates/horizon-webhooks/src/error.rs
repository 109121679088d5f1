//! Error types for webhook log generation and delivery.
//!
//! Delivery failures are rendered with `to_string()` into the
//! `error_message` column of the webhook log; a worker never propagates them.
//! Only store failures and lifecycle problems reach callers.

use std::time::Duration;

use horizon_core::{CoreError, WebhookId};
use thiserror::Error;

/// Result type alias for webhook operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised while generating or delivering webhook logs.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The request could not be sent or its response could not be read.
    #[error("failed to send request: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },

    /// The receiver did not answer in time.
    #[error("failed to send request: timeout after {timeout_seconds}s")]
    Timeout {
        /// Configured request timeout.
        timeout_seconds: u64,
    },

    /// The receiver answered with a non-2xx status.
    #[error("unexpected status code {status_code}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status_code: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The request could not be constructed from the snapshotted fields.
    #[error("failed to build request: {message}")]
    Request {
        /// Construction error description.
        message: String,
    },

    /// The body or headers could not be (de)serialized.
    #[error("failed to marshal request: {message}")]
    Marshal {
        /// Serialization error description.
        message: String,
    },

    /// Client or service configuration is invalid.
    #[error("invalid delivery configuration: {message}")]
    Configuration {
        /// Configuration error description.
        message: String,
    },

    /// Underlying store operation failed.
    #[error(transparent)]
    Store(#[from] CoreError),

    /// Requested entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of the entity.
        kind: &'static str,
        /// Identifier that was looked up.
        id: i64,
    },

    /// A worker task panicked.
    #[error("worker for webhook {webhook_id} panicked: {error}")]
    WorkerPanic {
        /// Webhook the worker served.
        webhook_id: WebhookId,
        /// Join error description.
        error: String,
    },

    /// Workers did not stop within the shutdown timeout.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Timeout that elapsed.
        timeout: Duration,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates an error for a non-2xx response.
    pub fn http_status(status_code: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus { status_code, body: body.into() }
    }

    /// Creates a request construction error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request { message: message.into() }
    }

    /// Creates a marshalling error.
    pub fn marshal(message: impl Into<String>) -> Self {
        Self::Marshal { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Returns whether the error describes a failed delivery attempt rather
    /// than a local problem.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::HttpStatus { .. }
                | Self::Request { .. }
                | Self::Marshal { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_failures_render_human_readable_messages() {
        assert_eq!(
            DeliveryError::network("connection refused").to_string(),
            "failed to send request: connection refused"
        );
        assert_eq!(
            DeliveryError::http_status(500, "boom").to_string(),
            "unexpected status code 500: boom"
        );
        assert_eq!(DeliveryError::timeout(30).to_string(), "failed to send request: timeout after 30s");
    }

    #[test]
    fn local_errors_are_not_delivery_failures() {
        assert!(DeliveryError::marshal("bad json").is_delivery_failure());
        assert!(DeliveryError::http_status(404, "").is_delivery_failure());
        assert!(!DeliveryError::configuration("bad tls").is_delivery_failure());
        assert!(!DeliveryError::from(CoreError::Store("down".into())).is_delivery_failure());
        assert!(!DeliveryError::not_found("webhook log", 1).is_delivery_failure());
    }
}
