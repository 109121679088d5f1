//! Fixed resource hierarchy for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use horizon_core::{
    error::Result,
    models::{ApplicationSummary, ClusterSummary, UserSummary},
    ResourceDirectory,
};

/// Resource directory built up front with builder calls.
///
/// ```text
/// StaticDirectory::new()
///     .group(1, None)
///     .group(2, Some(1))
///     .application(fixtures::application(10, 2))
///     .cluster(fixtures::cluster(100, 10))
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    group_parents: HashMap<i64, Option<i64>>,
    applications: HashMap<i64, ApplicationSummary>,
    clusters: HashMap<i64, ClusterSummary>,
    users: HashMap<i64, UserSummary>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group under `parent`, or at the top level for `None`.
    #[must_use]
    pub fn group(mut self, id: i64, parent: Option<i64>) -> Self {
        self.group_parents.insert(id, parent);
        self
    }

    /// Adds an application.
    #[must_use]
    pub fn application(mut self, application: ApplicationSummary) -> Self {
        self.applications.insert(application.id, application);
        self
    }

    /// Adds a cluster.
    #[must_use]
    pub fn cluster(mut self, cluster: ClusterSummary) -> Self {
        self.clusters.insert(cluster.id, cluster);
        self
    }

    /// Adds a user.
    #[must_use]
    pub fn user(mut self, user: UserSummary) -> Self {
        self.users.insert(user.id, user);
        self
    }
}

#[async_trait]
impl ResourceDirectory for StaticDirectory {
    async fn application(&self, id: i64) -> Result<Option<ApplicationSummary>> {
        Ok(self.applications.get(&id).cloned())
    }

    async fn cluster(&self, id: i64) -> Result<Option<ClusterSummary>> {
        Ok(self.clusters.get(&id).cloned())
    }

    async fn group_ancestors(&self, group_id: i64) -> Result<Vec<i64>> {
        let mut ancestors = Vec::new();
        let mut current = Some(group_id);
        while let Some(id) = current {
            if !self.group_parents.contains_key(&id) || ancestors.contains(&id) {
                break;
            }
            ancestors.push(id);
            current = self.group_parents.get(&id).copied().flatten();
        }
        Ok(ancestors)
    }

    async fn user(&self, id: i64) -> Result<Option<UserSummary>> {
        Ok(self.users.get(&id).cloned())
    }
}
