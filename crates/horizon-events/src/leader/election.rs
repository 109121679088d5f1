use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use horizon_core::Clock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{LeaderElector, LeadershipResult, RenewalResult};
use crate::error::Result;

/// Lease parameters of one election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Name of the lease contested by replicas.
    pub lock_key: String,

    /// Identity of this replica.
    pub instance_id: String,

    /// Lifetime of a lease that is not renewed.
    pub lease_duration: Duration,

    /// How long renewal may keep failing before leadership is given up.
    pub renew_deadline: Duration,

    /// Interval between acquisition attempts and between renewals.
    pub retry_period: Duration,
}

impl LeaseConfig {
    /// Creates a config with the default timings.
    pub fn new(lock_key: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            lock_key: lock_key.into(),
            instance_id: instance_id.into(),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
        }
    }
}

/// Work started and stopped with leadership.
#[async_trait]
pub trait LeaderCallbacks: Send + Sync + 'static {
    /// Runs while this replica leads; must return once `token` is cancelled.
    async fn on_started_leading(&self, token: CancellationToken);

    /// Called after the leading work has returned.
    async fn on_stopped_leading(&self);
}

/// Drives a [`LeaderElector`] for one lease and runs callbacks on
/// leadership changes.
pub struct LeaderElection {
    elector: Arc<dyn LeaderElector>,
    config: LeaseConfig,
    clock: Arc<dyn Clock>,
}

impl LeaderElection {
    /// Creates a runner for the configured lease.
    pub fn new(elector: Arc<dyn LeaderElector>, config: LeaseConfig, clock: Arc<dyn Clock>) -> Self {
        Self { elector, config, clock }
    }

    /// Contends for the lease until `shutdown` is cancelled.
    ///
    /// While leading, `on_started_leading` runs on its own task and the
    /// lease is renewed every retry period. When renewal is refused, or keeps
    /// failing past the renew deadline, the leading task is cancelled and
    /// awaited, `on_stopped_leading` is called and acquisition resumes. On
    /// shutdown the lease is released.
    ///
    /// # Errors
    ///
    /// Never fails today; elector errors are logged and retried.
    pub async fn run(&self, callbacks: Arc<dyn LeaderCallbacks>, shutdown: CancellationToken) -> Result<()> {
        info!(
            lock_key = %self.config.lock_key,
            instance_id = %self.config.instance_id,
            "starting leader election"
        );

        while let Some(lease_token) = self.acquire(&shutdown).await {
            info!(lock_key = %self.config.lock_key, instance_id = %self.config.instance_id, "started leading");

            let leading = shutdown.child_token();
            let task = {
                let callbacks = callbacks.clone();
                let leading = leading.clone();
                tokio::spawn(async move { callbacks.on_started_leading(leading).await })
            };

            self.hold(&lease_token, &leading).await;

            leading.cancel();
            if let Err(join_error) = task.await {
                error!(error = %join_error, "leading task ended abnormally");
            }
            callbacks.on_stopped_leading().await;
            info!(lock_key = %self.config.lock_key, instance_id = %self.config.instance_id, "stopped leading");

            if shutdown.is_cancelled() {
                match self.elector.release(&self.config.lock_key, &lease_token).await {
                    Ok(released) => debug!(released, "lease released"),
                    Err(err) => warn!(error = %err, "failed to release lease"),
                }
            }
        }

        info!(lock_key = %self.config.lock_key, "leader election stopped");
        Ok(())
    }

    /// Retries acquisition until it succeeds; `None` on shutdown.
    async fn acquire(&self, shutdown: &CancellationToken) -> Option<String> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            match self.elector.try_acquire(&self.config.lock_key, &self.config.instance_id).await {
                Ok(LeadershipResult::Acquired { lease_token, .. }) => return Some(lease_token),
                Ok(LeadershipResult::NotLeader { current_leader }) => {
                    debug!(current_leader = ?current_leader, "lease held by another instance");
                },
                Err(err) => warn!(error = %err, "failed to acquire lease"),
            }
            if !self.pause(shutdown).await {
                return None;
            }
        }
    }

    /// Renews the lease until it is lost or `leading` is cancelled.
    async fn hold(&self, lease_token: &str, leading: &CancellationToken) {
        let mut last_renewal = self.clock.now();
        loop {
            if !self.pause(leading).await {
                return;
            }
            match self.elector.renew(&self.config.lock_key, lease_token).await {
                Ok(RenewalResult::Renewed { .. }) => last_renewal = self.clock.now(),
                Ok(result) => {
                    warn!(result = ?result, "lease renewal refused");
                    return;
                },
                Err(err) => {
                    let failing_for = self.clock.now().duration_since(last_renewal);
                    warn!(error = %err, failing_for_ms = failing_for.as_millis(), "failed to renew lease");
                    if failing_for >= self.config.renew_deadline {
                        return;
                    }
                },
            }
        }
    }

    async fn pause(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            () = self.clock.sleep(self.config.retry_period) => true,
            () = token.cancelled() => false,
        }
    }
}
