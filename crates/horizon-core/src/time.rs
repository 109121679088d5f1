//! Time abstractions for testable polling loops and age checks.
//!
//! The consumer, delivery workers and cleaner all sleep between polls and
//! compare row timestamps against "now". Injecting a clock lets tests move
//! wall time forward without waiting.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, TimeZone, Utc};

/// Clock abstraction for time operations.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production clock backed by system time and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Manually driven clock for deterministic tests.
///
/// Sleeping advances the clock instead of waiting and then yields so other
/// tasks get to run.
#[derive(Debug, Clone)]
pub struct TestClock {
    elapsed_ns: Arc<AtomicU64>,
    wall_ms: Arc<AtomicI64>,
    base_instant: Instant,
}

impl TestClock {
    /// Creates a test clock starting at the current wall time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a test clock starting at a specific wall time.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            wall_ms: Arc::new(AtomicI64::new(start.timestamp_millis())),
            base_instant: Instant::now(),
        }
    }

    /// Advances both monotonic and wall time.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.elapsed_ns.fetch_add(nanos, Ordering::AcqRel);
        self.wall_ms.fetch_add(millis, Ordering::AcqRel);
    }

    /// Moves wall time to `time`; monotonic time is left untouched.
    pub fn set_utc(&self, time: DateTime<Utc>) {
        self.wall_ms.store(time.timestamp_millis(), Ordering::Release);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base_instant + Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }

    fn now_utc(&self) -> DateTime<Utc> {
        let millis = self.wall_ms.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}
