//! In-process leader elector.
//!
//! Only coordinates tasks sharing one instance; nothing is persisted. Expiry
//! is judged against the injected clock so tests can let leases lapse.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use horizon_core::{Clock, CoreError};
use uuid::Uuid;

use super::{LeaderElector, LeadershipResult, RenewalResult};
use crate::error::{EventError, Result};

#[derive(Debug, Clone)]
struct Lease {
    instance_id: String,
    token: String,
    expires_at: DateTime<Utc>,
}

/// Leader elector backed by a map guarded by a lock.
#[derive(Debug)]
pub struct InMemoryLeaderElector {
    leases: RwLock<HashMap<String, Lease>>,
    lease_duration: Duration,
    clock: Arc<dyn Clock>,
}

fn poison_err<T>(_: PoisonError<T>) -> EventError {
    EventError::Store(CoreError::Store("lease table lock poisoned".to_string()))
}

impl InMemoryLeaderElector {
    /// Creates an elector granting leases of `lease_duration`.
    pub fn new(lease_duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { leases: RwLock::new(HashMap::new()), lease_duration, clock }
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.lease_duration).unwrap_or(chrono::Duration::seconds(15))
    }
}

#[async_trait]
impl LeaderElector for InMemoryLeaderElector {
    async fn try_acquire(&self, lock_key: &str, instance_id: &str) -> Result<LeadershipResult> {
        let now = self.clock.now_utc();
        let mut leases = self.leases.write().map_err(poison_err)?;

        if let Some(lease) = leases.get(lock_key) {
            if lease.expires_at > now && lease.instance_id != instance_id {
                return Ok(LeadershipResult::NotLeader { current_leader: Some(lease.instance_id.clone()) });
            }
        }

        let lease = Lease {
            instance_id: instance_id.to_string(),
            token: Uuid::new_v4().to_string(),
            expires_at: self.expiry(now),
        };
        let lease_token = lease.token.clone();
        leases.insert(lock_key.to_string(), lease);

        Ok(LeadershipResult::Acquired { lease_token, lease_duration: self.lease_duration })
    }

    async fn renew(&self, lock_key: &str, lease_token: &str) -> Result<RenewalResult> {
        let now = self.clock.now_utc();
        let expires_at = self.expiry(now);
        let mut leases = self.leases.write().map_err(poison_err)?;

        let Some(lease) = leases.get_mut(lock_key) else {
            return Ok(RenewalResult::Lost);
        };
        if lease.token != lease_token {
            return Ok(RenewalResult::InvalidToken);
        }
        if lease.expires_at <= now {
            return Ok(RenewalResult::Lost);
        }

        lease.expires_at = expires_at;
        Ok(RenewalResult::Renewed { lease_duration: self.lease_duration })
    }

    async fn release(&self, lock_key: &str, lease_token: &str) -> Result<bool> {
        let mut leases = self.leases.write().map_err(poison_err)?;

        match leases.get(lock_key) {
            Some(lease) if lease.token == lease_token => {
                leases.remove(lock_key);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn current_leader(&self, lock_key: &str) -> Result<Option<String>> {
        let now = self.clock.now_utc();
        let leases = self.leases.read().map_err(poison_err)?;

        Ok(leases
            .get(lock_key)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.instance_id.clone()))
    }
}
