//! JSON bodies sent to webhook receivers.
//!
//! The body is rendered once when a log is generated and stored without the
//! log id, which only exists after insertion. The worker adds `id` right
//! before sending so receivers can correlate deliveries and resends.

use bytes::Bytes;
use horizon_core::models::{WebhookLogId, WebhookRequestBody};
use serde_json::Value;

use crate::error::{DeliveryError, Result};

/// Serializes a request body for storage in a webhook log.
///
/// # Errors
///
/// Returns `DeliveryError::Marshal` if serialization fails.
pub fn render(body: &WebhookRequestBody) -> Result<String> {
    serde_json::to_string(body).map_err(|e| DeliveryError::marshal(e.to_string()))
}

/// Returns the stored body with the log id set as its `id` field.
///
/// # Errors
///
/// Returns `DeliveryError::Marshal` if the stored body is not a JSON object.
pub fn with_log_id(request_data: &str, log_id: WebhookLogId) -> Result<Bytes> {
    let mut body: Value = serde_json::from_str(request_data)
        .map_err(|e| DeliveryError::marshal(format!("invalid stored request body: {e}")))?;

    let Value::Object(fields) = &mut body else {
        return Err(DeliveryError::marshal("stored request body is not a JSON object"));
    };
    fields.insert("id".to_string(), Value::from(log_id.0));

    serde_json::to_vec(&body)
        .map(Bytes::from)
        .map_err(|e| DeliveryError::marshal(e.to_string()))
}
