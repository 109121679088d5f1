//! Horizon webhook notification service.
//!
//! Producers append lifecycle events to a durable log. The replica holding
//! the consumer lease reads the log in order and turns each event into
//! waiting webhook logs; every replica delivers waiting logs through one
//! worker per webhook, and a scheduled cleaner drops expired rows.

#![forbid(unsafe_code)]

pub mod config;
pub mod pipeline;

pub use config::Config;
pub use pipeline::{Backends, ConsumerLeader, Settings};
