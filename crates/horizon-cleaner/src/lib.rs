//! Scheduled retention cleanup of events and webhook logs.
//!
//! [`RetentionCleaner`] wakes up on a cron schedule evaluated in a fixed
//! timezone and deletes rows whose age exceeds the TTL of the first rule
//! matching them. It is safe to run on every replica: deletes are by id and
//! deleting an already deleted row is a no-op.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cleaner;
pub mod error;
pub mod rules;
pub mod storage;

pub use cleaner::{CleanerConfig, CleanupReport, RetentionCleaner};
pub use error::{CleanerError, Result};
pub use rules::{EventRetentionRule, KubernetesEventMatcher, WebhookLogRetentionRule, MAX_TTL_SECONDS};
pub use storage::{PostgresRetentionStorage, RetentionStorage};
