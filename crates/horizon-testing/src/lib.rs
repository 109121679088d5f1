//! Test infrastructure for the webhook pipeline.
//!
//! Provides an in-memory store implementing every storage trait, a fixed
//! resource directory, fixture builders, a recording event handler and a
//! wiremock-backed webhook receiver, so whole flows run without a database.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod directory;
pub mod fixtures;
pub mod handlers;
pub mod http;
pub mod store;

pub use directory::StaticDirectory;
pub use fixtures::WebhookBuilder;
pub use handlers::{RecordedBatch, RecordingHandler};
pub use horizon_core::{Clock, TestClock};
pub use http::MockReceiver;
pub use store::{MemoryStore, Operation};
