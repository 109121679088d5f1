//! Leader elector storing leases in PostgreSQL.
//!
//! Leases live in `leader_leases`, keyed by (namespace, lock key). Expiry is
//! judged by the database clock so replicas with skewed clocks agree.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use horizon_core::storage::Storage;
use uuid::Uuid;

use super::{LeaderElector, LeadershipResult, RenewalResult};
use crate::error::Result;

/// Lease-table leader elector.
pub struct PostgresLeaderElector {
    storage: Arc<Storage>,
    namespace: String,
    lease_duration: Duration,
}

impl PostgresLeaderElector {
    /// Creates an elector for leases in `namespace`.
    pub fn new(storage: Arc<Storage>, namespace: impl Into<String>, lease_duration: Duration) -> Self {
        Self { storage, namespace: namespace.into(), lease_duration }
    }
}

#[async_trait]
impl LeaderElector for PostgresLeaderElector {
    async fn try_acquire(&self, lock_key: &str, instance_id: &str) -> Result<LeadershipResult> {
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .storage
            .leases
            .try_acquire(&self.namespace, lock_key, instance_id, &token, self.lease_duration)
            .await?;

        if acquired {
            return Ok(LeadershipResult::Acquired { lease_token: token, lease_duration: self.lease_duration });
        }
        let current_leader = self.storage.leases.current_holder(&self.namespace, lock_key).await?;
        Ok(LeadershipResult::NotLeader { current_leader })
    }

    async fn renew(&self, lock_key: &str, lease_token: &str) -> Result<RenewalResult> {
        let renewed = self
            .storage
            .leases
            .renew(&self.namespace, lock_key, lease_token, self.lease_duration)
            .await?;

        Ok(if renewed {
            RenewalResult::Renewed { lease_duration: self.lease_duration }
        } else {
            RenewalResult::Lost
        })
    }

    async fn release(&self, lock_key: &str, lease_token: &str) -> Result<bool> {
        Ok(self.storage.leases.release(&self.namespace, lock_key, lease_token).await?)
    }

    async fn current_leader(&self, lock_key: &str) -> Result<Option<String>> {
        Ok(self.storage.leases.current_holder(&self.namespace, lock_key).await?)
    }
}
