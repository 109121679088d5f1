//! Event handlers that record what the consumer hands them.

use std::sync::Mutex;

use async_trait::async_trait;
use horizon_core::models::{Event, EventId};
use horizon_events::EventHandler;

/// One `process` call as seen by a [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBatch {
    /// Ids of the events in the batch.
    pub ids: Vec<EventId>,
    /// Resume flag of the call.
    pub resume: bool,
}

/// Handler that records every batch and can fail a number of calls.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    batches: Mutex<Vec<RecordedBatch>>,
    failures_left: Mutex<u32>,
}

impl RecordingHandler {
    /// Creates a handler that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handler whose first `times` calls fail.
    pub fn failing(times: u32) -> Self {
        Self { batches: Mutex::new(Vec::new()), failures_left: Mutex::new(times) }
    }

    /// Every recorded call in order.
    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.batches.lock().map(|batches| batches.clone()).unwrap_or_default()
    }

    /// Ids seen across every call, in call order and with repeats.
    pub fn seen_ids(&self) -> Vec<EventId> {
        self.batches().into_iter().flat_map(|batch| batch.ids).collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn process(&self, events: &[Event], resume: bool) -> anyhow::Result<()> {
        let batch = RecordedBatch { ids: events.iter().map(|event| event.id).collect(), resume };
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(batch);
        }

        let mut failures_left = self.failures_left.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
        if *failures_left > 0 {
            *failures_left -= 1;
            anyhow::bail!("recording handler told to fail");
        }
        Ok(())
    }
}
