//! Lookup interface onto the group/application/cluster hierarchy.
//!
//! The managers owning these resources live outside the pipeline; it only
//! needs by-id lookups and ancestor listing to resolve which webhook scopes
//! an event falls under.

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{ApplicationSummary, ClusterSummary, UserSummary},
};

/// Read-only view of the resource hierarchy.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Finds an application by id.
    async fn application(&self, id: i64) -> Result<Option<ApplicationSummary>>;

    /// Finds a cluster by id.
    async fn cluster(&self, id: i64) -> Result<Option<ClusterSummary>>;

    /// Lists the ancestor groups of a group, nearest first, starting with
    /// the group itself. The virtual root is never included.
    async fn group_ancestors(&self, group_id: i64) -> Result<Vec<i64>>;

    /// Finds a user by id.
    async fn user(&self, id: i64) -> Result<Option<UserSummary>>;
}
