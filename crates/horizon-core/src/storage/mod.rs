//! PostgreSQL access layer, one repository per table.
//!
//! The repositories translate between domain models and rows. Pipeline
//! crates never issue SQL themselves; they reach the database through their
//! own storage traits, whose production adapters delegate here.

use std::sync::Arc;

use sqlx::PgPool;

pub mod cursors;
pub mod directory;
pub mod events;
pub mod leases;
pub mod schema;
pub mod webhook_logs;
pub mod webhooks;

use crate::error::Result;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for the append-only event log.
    pub events: Arc<events::Repository>,

    /// Repository for the singleton consumer cursor.
    pub cursors: Arc<cursors::Repository>,

    /// Repository for registered webhooks.
    pub webhooks: Arc<webhooks::Repository>,

    /// Repository for webhook delivery jobs.
    pub webhook_logs: Arc<webhook_logs::Repository>,

    /// Repository for leader election leases.
    pub leases: Arc<leases::Repository>,

    /// Lookups into the platform's resource hierarchy.
    pub directory: Arc<directory::Repository>,

    pool: Arc<PgPool>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            events: Arc::new(events::Repository::new(pool.clone())),
            cursors: Arc::new(cursors::Repository::new(pool.clone())),
            webhooks: Arc::new(webhooks::Repository::new(pool.clone())),
            webhook_logs: Arc::new(webhook_logs::Repository::new(pool.clone())),
            leases: Arc::new(leases::Repository::new(pool.clone())),
            directory: Arc::new(directory::Repository::new(pool.clone())),
            pool,
        }
    }

    /// Returns the shared connection pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates missing tables and indexes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Store` if any DDL statement fails.
    pub async fn migrate(&self) -> Result<()> {
        schema::apply(&self.pool).await
    }

    /// Verifies database connectivity with a trivial query.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Store` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool).await?;
        Ok(())
    }
}
