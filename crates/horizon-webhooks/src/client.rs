//! HTTP client posting webhook logs to their receivers.
//!
//! Two connection pools are kept, one verifying TLS certificates and one
//! accepting any certificate, and each request picks one according to the
//! webhook's `ssl_verify_enabled` flag. Non-2xx answers are returned as
//! responses; only transport and request construction failures are errors.

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use horizon_core::models::{EventId, WebhookId, WebhookLogId};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Response, Url,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{DeliveryError, Result};

/// Response bodies longer than this are truncated before being stored.
pub const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;

const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Configuration for the delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upper bound for one request including reading the response.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Horizon-Webhook/1.0".to_string(),
            max_redirects: 3,
        }
    }
}

/// One outgoing delivery.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Webhook log being delivered.
    pub log_id: WebhookLogId,
    /// Webhook the log belongs to.
    pub webhook_id: WebhookId,
    /// Event the log delivers.
    pub event_id: EventId,
    /// Receiver URL.
    pub url: String,
    /// Snapshotted request headers.
    pub headers: HashMap<String, String>,
    /// Request body including the log id.
    pub body: Bytes,
    /// Whether the receiver's certificate must be valid.
    pub ssl_verify: bool,
}

/// Receiver's answer to a delivery.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body, truncated to [`MAX_RESPONSE_BODY_SIZE`].
    pub body: String,
    /// Time taken by the round trip.
    pub duration: Duration,
    /// Whether the status was 2xx.
    pub is_success: bool,
}

/// HTTP client for webhook delivery.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    verifying: reqwest::Client,
    insecure: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if an HTTP client cannot be
    /// built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let verifying = build_client(&config, true)?;
        let insecure = build_client(&config, false)?;
        Ok(Self { verifying, insecure, config })
    }

    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if an HTTP client cannot be
    /// built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Returns the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// POSTs a delivery to its receiver.
    ///
    /// # Errors
    ///
    /// - `Request` if the URL or a header is invalid
    /// - `Timeout` if the receiver does not answer in time
    /// - `Network` for any other transport failure
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryResponse> {
        let span = info_span!(
            "webhook_delivery",
            log_id = %request.log_id,
            webhook_id = %request.webhook_id,
            event_id = %request.event_id,
            url = %request.url,
        );

        async move {
            let url = Url::parse(&request.url)
                .map_err(|e| DeliveryError::request(format!("invalid url {:?}: {e}", request.url)))?;
            let headers = build_headers(&request.headers)?;
            let client = if request.ssl_verify { &self.verifying } else { &self.insecure };

            let start = std::time::Instant::now();
            let response = client.post(url).headers(headers).body(request.body).send().await;
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(duration_ms = start.elapsed().as_millis(), error = %e, "request failed");
                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_builder() {
                        return Err(DeliveryError::request(e.to_string()));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let delivery_response = read_response(response, start).await?;
            debug!(
                status = delivery_response.status_code,
                duration_ms = delivery_response.duration.as_millis(),
                "received response"
            );
            Ok(delivery_response)
        }
        .instrument(span)
        .await
    }
}

fn build_client(config: &ClientConfig, verify_tls: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))
}

fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DeliveryError::request(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| DeliveryError::request(format!("invalid value for header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn read_response(response: Response, start: std::time::Instant) -> Result<DeliveryResponse> {
    let status = response.status();
    let headers = extract_headers(response.headers());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DeliveryError::network(format!("failed to read response body: {e}")))?;

    Ok(DeliveryResponse {
        status_code: status.as_u16(),
        headers,
        body: truncate_body(&bytes),
        duration: start.elapsed(),
        is_success: status.is_success(),
    })
}

fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_RESPONSE_BODY_SIZE {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let kept = &bytes[..MAX_RESPONSE_BODY_SIZE - TRUNCATION_SUFFIX.len()];
    format!("{}{TRUNCATION_SUFFIX}", String::from_utf8_lossy(kept))
}

/// Extracts headers with textual values.
///
/// Repeated headers keep the last value.
fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    header_map
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request(url: String) -> DeliveryRequest {
        DeliveryRequest {
            log_id: WebhookLogId(1),
            webhook_id: WebhookId(2),
            event_id: EventId(3),
            url,
            headers: HashMap::from([
                ("X-Horizon-Webhook-Secret".to_string(), "s3cret".to_string()),
                ("Content-Type".to_string(), "application/json;charset=utf-8".to_string()),
            ]),
            body: Bytes::from_static(br#"{"id":1}"#),
            ssl_verify: true,
        }
    }

    #[tokio::test]
    async fn successful_delivery_returns_response() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::header("X-Horizon-Webhook-Secret", "s3cret"))
            .and(matchers::header("Content-Type", "application/json;charset=utf-8"))
            .and(matchers::body_string(r#"{"id":1}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok").insert_header("x-reply", "yes"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let response = client.deliver(request(format!("{}/hook", server.uri()))).await.unwrap();

        assert!(response.is_success);
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "ok");
        assert_eq!(response.headers.get("x-reply").map(String::as_str), Some("yes"));
    }

    #[tokio::test]
    async fn server_error_is_a_response_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let response = client.deliver(request(server.uri())).await.unwrap();

        assert!(!response.is_success);
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, "boom");
    }

    #[tokio::test]
    async fn slow_receiver_times_out() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config = ClientConfig { timeout: Duration::from_millis(200), ..ClientConfig::default() };
        let client = DeliveryClient::new(config).unwrap();
        let err = client.deliver(request(server.uri())).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Timeout { .. }), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn invalid_url_is_a_request_error() {
        let client = DeliveryClient::with_defaults().unwrap();
        let err = client.deliver(request("not a url".to_string())).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Request { .. }));
    }

    #[tokio::test]
    async fn unreachable_receiver_is_a_network_error() {
        let client = DeliveryClient::with_defaults().unwrap();
        let err = client.deliver(request("http://127.0.0.1:1/hook".to_string())).await.unwrap_err();

        assert!(err.to_string().starts_with("failed to send request"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = vec![b'a'; MAX_RESPONSE_BODY_SIZE + 10];
        let truncated = truncate_body(&body);

        assert_eq!(truncated.len(), MAX_RESPONSE_BODY_SIZE);
        assert!(truncated.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(truncate_body(b"short"), "short");
    }
}
