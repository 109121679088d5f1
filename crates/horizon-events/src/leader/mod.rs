//! Leader election keeping the event consumer a cluster-wide singleton.
//!
//! Leaders hold time-bounded leases and must renew them; a replica that
//! cannot renew within the renew deadline stops leading. The
//! [`LeaderElection`] runner drives an elector and tells a
//! [`LeaderCallbacks`] implementation when leadership starts and stops.
//!
//! - [`PostgresLeaderElector`] stores leases in the `leader_leases` table.
//! - [`InMemoryLeaderElector`] coordinates tasks inside one process.

mod election;
pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;

pub use election::{LeaderCallbacks, LeaderElection, LeaseConfig};
pub use memory::InMemoryLeaderElector;
pub use postgres::PostgresLeaderElector;

use crate::error::Result;

/// Result of a leadership acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipResult {
    /// Leadership acquired.
    Acquired {
        /// Token identifying this lease for renewal and release.
        lease_token: String,
        /// Time until the lease expires unless renewed.
        lease_duration: Duration,
    },
    /// Another instance holds the lease.
    NotLeader {
        /// Holder of the lease, if known.
        current_leader: Option<String>,
    },
}

impl LeadershipResult {
    /// Returns true if leadership was acquired.
    #[must_use]
    pub const fn is_leader(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }

    /// Returns the lease token if leadership was acquired.
    #[must_use]
    pub fn lease_token(&self) -> Option<&str> {
        match self {
            Self::Acquired { lease_token, .. } => Some(lease_token),
            Self::NotLeader { .. } => None,
        }
    }
}

/// Result of a lease renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalResult {
    /// Lease extended.
    Renewed {
        /// Time until the extended lease expires.
        lease_duration: Duration,
    },
    /// Lease expired or was taken over.
    Lost,
    /// Token does not identify the current lease.
    InvalidToken,
}

impl RenewalResult {
    /// Returns true if the lease was renewed.
    #[must_use]
    pub const fn is_renewed(&self) -> bool {
        matches!(self, Self::Renewed { .. })
    }
}

/// Lease-based leader election.
#[async_trait]
pub trait LeaderElector: Send + Sync {
    /// Attempts to take the lease `lock_key` for `instance_id`.
    async fn try_acquire(&self, lock_key: &str, instance_id: &str) -> Result<LeadershipResult>;

    /// Extends a held lease.
    async fn renew(&self, lock_key: &str, lease_token: &str) -> Result<RenewalResult>;

    /// Gives up a held lease. Returns `false` if it was no longer held.
    async fn release(&self, lock_key: &str, lease_token: &str) -> Result<bool>;

    /// Returns the holder of an unexpired lease.
    async fn current_leader(&self, lock_key: &str) -> Result<Option<String>>;
}
