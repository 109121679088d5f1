//! Webhook fan-out: log generation, per-webhook delivery and resend.
//!
//! # Architecture
//!
//! ```text
//! EventConsumer ──▶ WebhookLogGenerator ──▶ webhook_logs (waiting)
//!                                                 │
//!            DeliveryService (reconcile tick)     │
//!              ├── WebhookWorker(webhook 1) ◀─────┤
//!              └── WebhookWorker(webhook n) ◀─────┘
//!                         │
//!                         ▼
//!                 POST receiver, record success/failed
//! ```
//!
//! Delivery is at-least-once and never retried automatically; a failed log
//! stays failed until [`WebhookLogService::resend`] queues a new attempt.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod generator;
pub mod payload;
pub mod resend;
pub mod service;
pub mod storage;
pub mod worker;

pub use client::{ClientConfig, DeliveryClient, DeliveryRequest, DeliveryResponse};
pub use error::{DeliveryError, Result};
pub use generator::{Ownership, WebhookLogGenerator};
pub use resend::WebhookLogService;
pub use service::{DeliveryConfig, DeliveryService, ReconcileReport};
pub use storage::{LogHighWaterMark, PostgresWebhookStorage, WebhookStorage};
pub use worker::{WebhookWorker, WorkerSettings};

/// Name under which the generator registers with the event consumer.
pub const GENERATOR_HANDLER_NAME: &str = "webhook-log-generator";
