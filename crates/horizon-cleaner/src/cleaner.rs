//! Cron-scheduled deletion of aged events and webhook logs.
//!
//! Every run scans both tables in id order, one page at a time, with a scan
//! cursor local to the run. The cursor moves to the highest id of each page
//! before the expired rows of that page are deleted, so concurrent deletes
//! never make a page be read twice. "Now" is captured once per run and
//! every TTL is measured against it.
//!
//! Cancellation is only honored between pages; a page that started being
//! processed is always finished.

use std::{future::Future, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use horizon_core::{
    models::{EventId, WebhookLogId},
    Clock,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{CleanerError, Result},
    rules::{event_expired, webhook_log_expired, EventRetentionRule, WebhookLogRetentionRule},
    storage::RetentionStorage,
};

/// Default cron expression: every day at 03:00:00.
pub const DEFAULT_SCHEDULE: &str = "0 0 3 * * *";

/// Default timezone the schedule is evaluated in.
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

/// Default number of rows scanned per page.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

const STORE_ATTEMPTS: u32 = 3;
const STORE_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Schedule, page size and TTL rules of the cleaner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanerConfig {
    /// Cron expression with a leading seconds field.
    pub schedule: String,
    /// IANA timezone name the schedule is evaluated in.
    pub timezone: String,
    /// Rows scanned per page.
    pub batch_size: usize,
    /// Event rules, first match wins.
    pub event_rules: Vec<EventRetentionRule>,
    /// Webhook log rules, first match wins.
    pub webhook_log_rules: Vec<WebhookLogRetentionRule>,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_SCHEDULE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            event_rules: Vec::new(),
            webhook_log_rules: Vec::new(),
        }
    }
}

impl CleanerConfig {
    /// Parses the cron expression.
    ///
    /// # Errors
    ///
    /// Returns `CleanerError::InvalidSchedule` if it does not parse.
    pub fn parse_schedule(&self) -> Result<Schedule> {
        Schedule::from_str(&self.schedule).map_err(|err| CleanerError::InvalidSchedule {
            expression: self.schedule.clone(),
            message: err.to_string(),
        })
    }

    /// Parses the timezone name.
    ///
    /// # Errors
    ///
    /// Returns `CleanerError::InvalidTimezone` for unknown names.
    pub fn parse_timezone(&self) -> Result<Tz> {
        let Ok(tz): std::result::Result<Tz, _> = self.timezone.parse() else {
            return Err(CleanerError::InvalidTimezone { name: self.timezone.clone() });
        };
        Ok(tz)
    }
}

/// Counts gathered by one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Events read.
    pub events_scanned: u64,
    /// Events removed.
    pub events_deleted: u64,
    /// Webhook logs read.
    pub webhook_logs_scanned: u64,
    /// Webhook logs removed.
    pub webhook_logs_deleted: u64,
}

/// Scheduled retention job.
pub struct RetentionCleaner {
    storage: Arc<dyn RetentionStorage>,
    schedule: Schedule,
    timezone: Tz,
    config: CleanerConfig,
    clock: Arc<dyn Clock>,
}

impl RetentionCleaner {
    /// Creates a cleaner, validating the schedule and timezone.
    ///
    /// # Errors
    ///
    /// Returns `CleanerError::InvalidSchedule` or
    /// `CleanerError::InvalidTimezone` for a bad configuration.
    pub fn new(storage: Arc<dyn RetentionStorage>, config: CleanerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let schedule = config.parse_schedule()?;
        let timezone = config.parse_timezone()?;
        Ok(Self { storage, schedule, timezone, config, clock })
    }

    /// First scheduled run strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.timezone);
        self.schedule.after(&local).next().map(|next| next.with_timezone(&Utc))
    }

    /// Sleeps until each scheduled time and runs a cleanup, until `token`
    /// is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!(
            schedule = %self.config.schedule,
            timezone = %self.timezone,
            event_rules = self.config.event_rules.len(),
            webhook_log_rules = self.config.webhook_log_rules.len(),
            "retention cleaner started"
        );

        while !token.is_cancelled() {
            let now = self.clock.now_utc();
            let Some(next) = self.next_run_after(now) else {
                warn!(schedule = %self.config.schedule, "schedule has no upcoming run, stopping cleaner");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next_run = %next, "next retention cleanup scheduled");

            tokio::select! {
                () = self.clock.sleep(wait) => {},
                () = token.cancelled() => break,
            }

            if let Err(err) = self.sweep(&token).await {
                error!(error = %err, "retention cleanup failed");
            }
        }

        info!("retention cleaner stopped");
    }

    /// Runs one full cleanup immediately.
    ///
    /// # Errors
    ///
    /// Returns `CleanerError::Store` if a page cannot be read or deleted
    /// after retrying. Rows deleted before the failure stay deleted.
    pub async fn run_once(&self) -> Result<CleanupReport> {
        self.sweep(&CancellationToken::new()).await
    }

    async fn sweep(&self, token: &CancellationToken) -> Result<CleanupReport> {
        let now = self.clock.now_utc();
        let mut report = CleanupReport::default();

        self.sweep_events(now, token, &mut report).await?;
        self.sweep_webhook_logs(now, token, &mut report).await?;

        info!(
            events_scanned = report.events_scanned,
            events_deleted = report.events_deleted,
            webhook_logs_scanned = report.webhook_logs_scanned,
            webhook_logs_deleted = report.webhook_logs_deleted,
            "retention cleanup finished"
        );
        Ok(report)
    }

    async fn sweep_events(
        &self,
        now: DateTime<Utc>,
        token: &CancellationToken,
        report: &mut CleanupReport,
    ) -> Result<()> {
        if self.config.event_rules.is_empty() {
            return Ok(());
        }
        let limit = self.page_limit();
        let mut after = EventId(0);

        while !token.is_cancelled() {
            let page = self.with_retry("list events", || self.storage.list_events_after(after, limit)).await?;
            let Some(last) = page.last().map(|event| event.id) else {
                break;
            };
            after = last;
            report.events_scanned += page.len() as u64;

            let expired: Vec<EventId> = page
                .iter()
                .filter(|event| event_expired(&self.config.event_rules, event, now))
                .map(|event| event.id)
                .collect();
            if !expired.is_empty() {
                let expired = expired.as_slice();
                let deleted = self.with_retry("delete events", || self.storage.delete_events(expired)).await?;
                report.events_deleted += deleted;
                debug!(deleted, scan_cursor = %after, "expired events deleted");
            }

            if page.len() < self.config.batch_size {
                break;
            }
        }
        Ok(())
    }

    async fn sweep_webhook_logs(
        &self,
        now: DateTime<Utc>,
        token: &CancellationToken,
        report: &mut CleanupReport,
    ) -> Result<()> {
        if self.config.webhook_log_rules.is_empty() {
            return Ok(());
        }
        let limit = self.page_limit();
        let mut after = WebhookLogId(0);

        while !token.is_cancelled() {
            let page = self
                .with_retry("list webhook logs", || self.storage.list_webhook_logs_after(after, limit))
                .await?;
            let Some(last) = page.last().map(|log| log.id) else {
                break;
            };
            after = last;
            report.webhook_logs_scanned += page.len() as u64;

            let expired: Vec<WebhookLogId> = page
                .iter()
                .filter(|log| webhook_log_expired(&self.config.webhook_log_rules, log, now))
                .map(|log| log.id)
                .collect();
            if !expired.is_empty() {
                let expired = expired.as_slice();
                let deleted = self
                    .with_retry("delete webhook logs", || self.storage.delete_webhook_logs(expired))
                    .await?;
                report.webhook_logs_deleted += deleted;
                debug!(deleted, scan_cursor = %after, "expired webhook logs deleted");
            }

            if page.len() < self.config.batch_size {
                break;
            }
        }
        Ok(())
    }

    fn page_limit(&self) -> i64 {
        i64::try_from(self.config.batch_size.max(1)).unwrap_or(i64::MAX)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = horizon_core::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < STORE_ATTEMPTS => {
                    warn!(operation, attempt, error = %err, "retention store operation failed, retrying");
                    attempt += 1;
                    self.clock.sleep(STORE_RETRY_BACKOFF).await;
                },
                Err(err) => return Err(err.into()),
            }
        }
    }
}
