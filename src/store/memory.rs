//! In-memory job store for tests and single-process setups.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::{self, Job, JobStatus};
use crate::store::{CasOutcome, JobStore};

/// Job records behind a `tokio::sync::RwLock`.
///
/// The conditional update holds the write lock across its check and write,
/// which gives the same atomicity the SQL backend gets from a single
/// conditional `UPDATE`.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, name: &str, spec: &serde_json::Value) -> Result<Job, StoreError> {
        let job = Job::new(name, spec.clone());
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut pending: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn compare_and_transition(
        &self,
        id: Uuid,
        expected: JobStatus,
        new: JobStatus,
        message: &str,
    ) -> Result<CasOutcome, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = match jobs.get_mut(&id) {
            Some(job) => job,
            None => return Ok(CasOutcome::Missing),
        };
        if job.status != expected {
            return Ok(CasOutcome::Conflict { actual: job.status });
        }

        let now = Utc::now();
        job.status = new;
        job.log.push(job::log_line(now, message));
        job.last_updated = now;
        Ok(CasOutcome::Updated(job.clone()))
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut stale: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Running && j.last_updated < cutoff)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(stale)
    }
}
