//! Singleton loop that reads the event log in order and fans batches out to
//! registered handlers.
//!
//! A run goes through three phases:
//!
//! 1. **Boot** loads the persisted cursor, retrying on store failures. A
//!    missing cursor means a fresh start at position 0.
//! 2. **Resume** runs only when the downstream high-water mark is ahead of
//!    the cursor. The gap is replayed with `resume = true` so handlers can
//!    drop work they already did before the last crash.
//! 3. **Normal** fetches batches after the in-memory cursor, dispatches them
//!    and advances the cursor to the last id of each batch.
//!
//! A checkpoint task persists the in-memory cursor every interval, and the
//! final position is persisted synchronously when the run is cancelled.
//! Only one replica may run the loop at a time; see [`crate::leader`].

use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use horizon_core::{
    models::{Event, EventId},
    Clock,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{EventError, Result},
    handler::{EventHandler, ResumeMarker},
    storage::EventStorage,
};

/// Default number of events fetched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Interval between boot attempts while the cursor cannot be loaded.
pub const BOOT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Tuning knobs of the consumer loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Maximum events fetched and dispatched at once.
    pub batch_size: usize,

    /// Sleep after an empty fetch.
    pub idle_wait: Duration,

    /// How often the in-memory cursor is persisted.
    pub checkpoint_interval: Duration,

    /// Sleep between failed boot attempts.
    pub boot_retry_interval: Duration,

    /// Sleep after a failed fetch or a failed handler dispatch.
    pub error_backoff: Duration,

    /// How many times a batch is re-dispatched after a handler failure
    /// before the cursor moves past it anyway.
    pub max_handler_retries: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            idle_wait: Duration::from_secs(1),
            checkpoint_interval: Duration::from_secs(5),
            boot_retry_interval: BOOT_RETRY_INTERVAL,
            error_backoff: Duration::from_secs(1),
            max_handler_retries: 3,
        }
    }
}

struct RegisteredHandler {
    name: String,
    handler: Arc<dyn EventHandler>,
}

/// Ordered event consumer with named handlers.
pub struct EventConsumer {
    storage: Arc<dyn EventStorage>,
    handlers: Vec<RegisteredHandler>,
    resume_marker: Option<Arc<dyn ResumeMarker>>,
    config: ConsumerConfig,
    clock: Arc<dyn Clock>,
}

impl EventConsumer {
    /// Creates a consumer with no handlers.
    pub fn new(storage: Arc<dyn EventStorage>, config: ConsumerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { storage, handlers: Vec::new(), resume_marker: None, config, clock }
    }

    /// Sets the source of the resume high-water mark.
    #[must_use]
    pub fn with_resume_marker(mut self, marker: Arc<dyn ResumeMarker>) -> Self {
        self.resume_marker = Some(marker);
        self
    }

    /// Registers a handler under a unique name.
    ///
    /// Handlers are dispatched in registration order.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DuplicateHandler` if the name is taken.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: Arc<dyn EventHandler>) -> Result<()> {
        let name = name.into();
        if self.handlers.iter().any(|registered| registered.name == name) {
            return Err(EventError::duplicate_handler(name));
        }
        info!(handler = %name, "event handler registered");
        self.handlers.push(RegisteredHandler { name, handler });
        Ok(())
    }

    /// Names of the registered handlers, in dispatch order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|registered| registered.name.as_str()).collect()
    }

    /// Runs boot, resume and normal phases until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Store` if the final cursor cannot be persisted
    /// on shutdown. Every other failure is logged and retried.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let Some(start) = self.boot(&token).await else {
            info!("event consumer cancelled during boot");
            return Ok(());
        };
        info!(position = %start, handlers = self.handlers.len(), "event consumer started");

        let cursor = Arc::new(AtomicI64::new(start.0));
        let checkpoint_token = token.child_token();
        let checkpoint = tokio::spawn(checkpoint_loop(
            self.storage.clone(),
            self.clock.clone(),
            cursor.clone(),
            start,
            self.config.checkpoint_interval,
            checkpoint_token.clone(),
        ));

        if let Some(mark) = self.high_water_mark(&token).await {
            if mark > start {
                self.resume(start, mark, &cursor, &token).await;
            }
        }
        self.consume(&cursor, &token).await;

        checkpoint_token.cancel();
        if let Err(join_error) = checkpoint.await {
            warn!(error = %join_error, "checkpoint task ended abnormally");
        }

        let position = EventId(cursor.load(Ordering::Acquire));
        self.persist(position).await?;
        info!(position = %position, "event consumer stopped");
        Ok(())
    }

    /// Loads the starting position, retrying until it succeeds.
    ///
    /// Returns `None` if cancelled first.
    async fn boot(&self, token: &CancellationToken) -> Option<EventId> {
        loop {
            match self.storage.find_cursor().await {
                Ok(Some(cursor)) => return Some(cursor.position),
                Ok(None) => return Some(EventId(0)),
                Err(err) if err.is_not_found() => return Some(EventId(0)),
                Err(err) => {
                    warn!(error = %err, "failed to load event cursor, retrying");
                },
            }
            if !self.pause(self.config.boot_retry_interval, token).await {
                return None;
            }
        }
    }

    async fn high_water_mark(&self, token: &CancellationToken) -> Option<EventId> {
        let marker = self.resume_marker.as_ref()?;
        loop {
            match marker.high_water_mark().await {
                Ok(mark) => return mark,
                Err(err) => {
                    warn!(error = %err, "failed to load resume high-water mark, retrying");
                },
            }
            if !self.pause(self.config.boot_retry_interval, token).await {
                return None;
            }
        }
    }

    /// Replays `(start, mark]` in resume mode.
    async fn resume(&self, start: EventId, mark: EventId, cursor: &AtomicI64, token: &CancellationToken) {
        info!(from = %start, to = %mark, "replaying events in resume mode");
        let width = i64::try_from(self.config.batch_size.max(1)).unwrap_or(i64::MAX);
        let mut low = start.0.saturating_add(1);

        while low <= mark.0 {
            let high = low.saturating_add(width - 1).min(mark.0);
            let events = match self.storage.list_events_range(EventId(low), EventId(high)).await {
                Ok(events) => events,
                Err(err) => {
                    warn!(error = %err, from = low, to = high, "failed to list events for resume");
                    if !self.pause(self.config.error_backoff, token).await {
                        return;
                    }
                    continue;
                },
            };

            if !events.is_empty() && !self.dispatch_with_retry(&events, true, token).await {
                return;
            }
            cursor.store(high, Ordering::Release);
            low = high.saturating_add(1);
        }
        info!(position = %mark, "resume complete");
    }

    async fn consume(&self, cursor: &AtomicI64, token: &CancellationToken) {
        let limit = i64::try_from(self.config.batch_size.max(1)).unwrap_or(i64::MAX);

        while !token.is_cancelled() {
            let after = EventId(cursor.load(Ordering::Acquire));
            let events = match self.storage.list_events_after(after, limit).await {
                Ok(events) => events,
                Err(err) => {
                    warn!(error = %err, after = %after, "failed to list events");
                    self.pause(self.config.error_backoff, token).await;
                    continue;
                },
            };

            let Some(last) = events.last().map(|event| event.id) else {
                self.pause(self.config.idle_wait, token).await;
                continue;
            };

            debug!(batch_size = events.len(), first = %events[0].id, last = %last, "dispatching batch");
            if !self.dispatch_with_retry(&events, false, token).await {
                return;
            }
            cursor.store(last.0, Ordering::Release);
        }
    }

    /// Dispatches a batch, re-dispatching it in resume mode after handler
    /// failures.
    ///
    /// Returns `false` if cancelled before the batch was settled, in which
    /// case the cursor must not move past it.
    async fn dispatch_with_retry(&self, events: &[Event], resume: bool, token: &CancellationToken) -> bool {
        let mut resume = resume;
        let mut attempt = 0u32;
        loop {
            let failed = self.dispatch(events, resume).await;
            if failed == 0 {
                return true;
            }
            if attempt >= self.config.max_handler_retries {
                error!(
                    failed_handlers = failed,
                    attempts = attempt + 1,
                    first = %events[0].id,
                    "giving up on batch after handler failures"
                );
                return true;
            }
            attempt += 1;
            resume = true;
            warn!(failed_handlers = failed, attempt, "re-dispatching batch in resume mode");
            if !self.pause(self.config.error_backoff, token).await {
                return false;
            }
        }
    }

    /// Hands the batch to every handler and returns how many failed.
    async fn dispatch(&self, events: &[Event], resume: bool) -> usize {
        let mut failed = 0;
        for registered in &self.handlers {
            if let Err(err) = registered.handler.process(events, resume).await {
                failed += 1;
                error!(
                    handler = %registered.name,
                    error = %err,
                    batch_size = events.len(),
                    resume,
                    "event handler failed"
                );
            }
        }
        failed
    }

    async fn persist(&self, position: EventId) -> Result<()> {
        self.storage.save_cursor(position).await?;
        debug!(position = %position, "event cursor persisted");
        Ok(())
    }

    /// Sleeps unless cancelled; returns `false` on cancellation.
    async fn pause(&self, duration: Duration, token: &CancellationToken) -> bool {
        tokio::select! {
            () = self.clock.sleep(duration) => true,
            () = token.cancelled() => false,
        }
    }
}

async fn checkpoint_loop(
    storage: Arc<dyn EventStorage>,
    clock: Arc<dyn Clock>,
    cursor: Arc<AtomicI64>,
    start: EventId,
    interval: Duration,
    token: CancellationToken,
) {
    let mut persisted = start.0;
    loop {
        tokio::select! {
            () = clock.sleep(interval) => {},
            () = token.cancelled() => break,
        }

        let position = cursor.load(Ordering::Acquire);
        if position == persisted {
            continue;
        }
        match storage.save_cursor(EventId(position)).await {
            Ok(_) => {
                persisted = position;
                debug!(position, "event cursor checkpointed");
            },
            Err(err) => warn!(error = %err, position, "failed to checkpoint event cursor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = ConsumerConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.boot_retry_interval, Duration::from_secs(3));
        assert_eq!(config.checkpoint_interval, Duration::from_secs(5));
        assert_eq!(config.max_handler_retries, 3);
    }
}
