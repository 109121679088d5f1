//! Extension points of the consumer loop.

use async_trait::async_trait;
use horizon_core::models::{Event, EventId};

/// Consumer of ordered event batches.
///
/// Handlers are independent: an error from one is logged by the consumer
/// and does not prevent the others from seeing the batch. When `resume` is
/// true the batch may contain events the handler already acted on and it
/// must deduplicate.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes a batch of events in ascending id order.
    async fn process(&self, events: &[Event], resume: bool) -> anyhow::Result<()>;
}

/// Source of the downstream high-water mark consulted at boot.
///
/// If the mark is ahead of the persisted cursor the consumer replays the
/// gap in resume mode before continuing normally.
#[async_trait]
pub trait ResumeMarker: Send + Sync {
    /// Returns the greatest event id already acted upon downstream.
    async fn high_water_mark(&self) -> horizon_core::Result<Option<EventId>>;
}
