//! Webhook receiver mock built on wiremock.

use std::time::Duration;

use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

/// Path every mocked receiver listens on.
pub const HOOK_PATH: &str = "/hook";

/// HTTP endpoint standing in for a webhook receiver.
pub struct MockReceiver {
    server: MockServer,
}

impl MockReceiver {
    /// Starts a receiver on a random port with no responses mounted.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Starts a receiver answering every POST with `status`.
    pub async fn responding(status: u16) -> Self {
        let receiver = Self::start().await;
        receiver.respond_with(ResponseTemplate::new(status).set_body_string("ok")).await;
        receiver
    }

    /// URL webhooks should post to.
    pub fn url(&self) -> String {
        format!("{}{HOOK_PATH}", self.server.uri())
    }

    /// Mounts a response for POSTs to [`HOOK_PATH`].
    pub async fn respond_with(&self, response: ResponseTemplate) {
        Mock::given(method("POST")).and(path(HOOK_PATH)).respond_with(response).mount(&self.server).await;
    }

    /// Mounts a response that only arrives after `delay`.
    pub async fn respond_slowly(&self, delay: Duration) {
        self.respond_with(ResponseTemplate::new(200).set_delay(delay)).await;
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// JSON bodies of every request received so far.
    pub async fn bodies(&self) -> Vec<Value> {
        self.requests().await.iter().filter_map(|request| serde_json::from_slice(&request.body).ok()).collect()
    }
}
