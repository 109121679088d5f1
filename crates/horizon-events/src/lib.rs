//! Durable event log and the ordered, crash-resumable consumer reading it.
//!
//! Producers append events through [`EventStore`]. A single
//! [`EventConsumer`], kept unique across replicas by [`leader`] election,
//! reads the log in id order and hands batches to named [`EventHandler`]s.
//!
//! ```text
//! producers ──▶ EventStore ──▶ events table
//!                                  │
//!                                  ▼
//!                 EventConsumer (leader only) ──▶ handlers
//!                      │
//!                      └── cursor checkpoint ──▶ event_cursors table
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod error;
pub mod handler;
pub mod leader;
pub mod storage;
pub mod store;

pub use consumer::{ConsumerConfig, EventConsumer};
pub use error::{EventError, Result};
pub use handler::{EventHandler, ResumeMarker};
pub use leader::{
    InMemoryLeaderElector, LeaderCallbacks, LeaderElection, LeaderElector, LeadershipResult,
    LeaseConfig, PostgresLeaderElector, RenewalResult,
};
pub use storage::{EventStorage, PostgresEventStorage};
pub use store::EventStore;
