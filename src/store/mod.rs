//! Persistence for job records.
//!
//! All mutation funnels through [`JobStore::compare_and_transition`], the one
//! atomic primitive that makes claims and status updates race-free. Backends
//! only promise that primitive; ordering and transition policy live above.

mod libsql_backend;
mod memory;
pub mod migrations;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::{Job, JobStatus};

/// Outcome of a conditional status update.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The expected status matched; the updated record is returned.
    Updated(Job),

    /// The job's current status was not the expected one; nothing was written.
    Conflict { actual: JobStatus },

    /// No job with that id exists.
    Missing,
}

/// Keyed storage for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a pending job with an empty log. The payload is stored verbatim.
    async fn create(&self, name: &str, spec: &serde_json::Value) -> Result<Job, StoreError>;

    /// Point lookup by id.
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// All pending jobs, oldest first (ties broken by id).
    async fn list_pending(&self) -> Result<Vec<Job>, StoreError>;

    /// Set the status and append one log entry, but only if the job's current
    /// status equals `expected`. The check and the write are a single atomic
    /// step: of any set of concurrent callers expecting the same status, at
    /// most one observes [`CasOutcome::Updated`].
    async fn compare_and_transition(
        &self,
        id: Uuid,
        expected: JobStatus,
        new: JobStatus,
        message: &str,
    ) -> Result<CasOutcome, StoreError>;

    /// Running jobs whose `last_updated` is older than `cutoff`, oldest first.
    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError>;
}
