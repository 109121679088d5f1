//! Leader election runner with the in-memory elector.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use horizon_core::RealClock;
use horizon_events::{
    InMemoryLeaderElector, LeaderCallbacks, LeaderElection, LeaderElector, LeadershipResult,
    LeaseConfig, RenewalResult,
};
use tokio_util::sync::CancellationToken;

const LOCK_KEY: &str = "horizon-event-consumer";

#[derive(Default)]
struct CountingCallbacks {
    started: AtomicUsize,
    stopped: AtomicUsize,
}

#[async_trait]
impl LeaderCallbacks for CountingCallbacks {
    async fn on_started_leading(&self, token: CancellationToken) {
        self.started.fetch_add(1, Ordering::SeqCst);
        token.cancelled().await;
    }

    async fn on_stopped_leading(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

fn lease_config(instance_id: &str) -> LeaseConfig {
    LeaseConfig {
        lease_duration: Duration::from_millis(300),
        renew_deadline: Duration::from_millis(200),
        retry_period: Duration::from_millis(10),
        ..LeaseConfig::new(LOCK_KEY, instance_id)
    }
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn spawn_election(
    elector: Arc<dyn LeaderElector>,
    instance_id: &str,
    callbacks: Arc<CountingCallbacks>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let election = LeaderElection::new(elector, lease_config(instance_id), Arc::new(RealClock::new()));
    tokio::spawn(async move {
        election.run(callbacks, shutdown).await.unwrap();
    })
}

#[tokio::test]
async fn leader_runs_callbacks_and_releases_on_shutdown() {
    let elector = Arc::new(InMemoryLeaderElector::new(Duration::from_millis(300), Arc::new(RealClock::new())));
    let callbacks = Arc::new(CountingCallbacks::default());
    let shutdown = CancellationToken::new();

    let handle = spawn_election(elector.clone(), "replica-a", callbacks.clone(), shutdown.clone());
    wait_for(|| callbacks.started.load(Ordering::SeqCst) == 1).await;
    assert_eq!(elector.current_leader(LOCK_KEY).await.unwrap().as_deref(), Some("replica-a"));

    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(callbacks.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(elector.current_leader(LOCK_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn standby_takes_over_after_leader_shuts_down() {
    let elector: Arc<dyn LeaderElector> =
        Arc::new(InMemoryLeaderElector::new(Duration::from_millis(300), Arc::new(RealClock::new())));

    let first = Arc::new(CountingCallbacks::default());
    let first_shutdown = CancellationToken::new();
    let first_handle = spawn_election(elector.clone(), "replica-a", first.clone(), first_shutdown.clone());
    wait_for(|| first.started.load(Ordering::SeqCst) == 1).await;

    let second = Arc::new(CountingCallbacks::default());
    let second_shutdown = CancellationToken::new();
    let second_handle = spawn_election(elector.clone(), "replica-b", second.clone(), second_shutdown.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(second.started.load(Ordering::SeqCst), 0, "standby must not lead while the lease is held");

    first_shutdown.cancel();
    first_handle.await.unwrap();
    wait_for(|| second.started.load(Ordering::SeqCst) == 1).await;
    assert_eq!(elector.current_leader(LOCK_KEY).await.unwrap().as_deref(), Some("replica-b"));

    second_shutdown.cancel();
    second_handle.await.unwrap();
}

/// Elector that grants every acquisition and refuses every renewal.
#[derive(Default)]
struct RefusingElector {
    acquisitions: AtomicUsize,
}

#[async_trait]
impl LeaderElector for RefusingElector {
    async fn try_acquire(&self, _lock_key: &str, _instance_id: &str) -> horizon_events::Result<LeadershipResult> {
        let n = self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(LeadershipResult::Acquired { lease_token: format!("token-{n}"), lease_duration: Duration::from_secs(1) })
    }

    async fn renew(&self, _lock_key: &str, _lease_token: &str) -> horizon_events::Result<RenewalResult> {
        Ok(RenewalResult::Lost)
    }

    async fn release(&self, _lock_key: &str, _lease_token: &str) -> horizon_events::Result<bool> {
        Ok(true)
    }

    async fn current_leader(&self, _lock_key: &str) -> horizon_events::Result<Option<String>> {
        Ok(None)
    }
}

#[tokio::test]
async fn lost_lease_stops_leading_and_reacquires() {
    let elector = Arc::new(RefusingElector::default());
    let callbacks = Arc::new(CountingCallbacks::default());
    let shutdown = CancellationToken::new();

    let handle = spawn_election(elector.clone(), "replica-a", callbacks.clone(), shutdown.clone());
    wait_for(|| callbacks.stopped.load(Ordering::SeqCst) >= 1 && callbacks.started.load(Ordering::SeqCst) >= 2)
        .await;

    shutdown.cancel();
    handle.await.unwrap();

    let started = callbacks.started.load(Ordering::SeqCst);
    assert_eq!(callbacks.stopped.load(Ordering::SeqCst), started);
    assert_eq!(elector.acquisitions.load(Ordering::SeqCst), started);
}
