//! The job ledger, the single mutation surface producers and consumers use.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, StoreError};
use crate::job::{Job, JobStatus};
use crate::queue::QueueCoordinator;
use crate::spec::JobSpec;
use crate::store::{CasOutcome, JobStore};
use crate::transition::TransitionEngine;

/// Creates, hands out, and advances jobs.
///
/// Every mutation goes through the store's conditional update, either via
/// the queue (claims) or the transition engine (status reports), so no two
/// callers can ever apply conflicting writes to the same job.
pub struct JobLedger {
    store: Arc<dyn JobStore>,
    queue: QueueCoordinator,
    transitions: TransitionEngine,
}

impl JobLedger {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            queue: QueueCoordinator::new(Arc::clone(&store)),
            transitions: TransitionEngine::new(Arc::clone(&store)),
            store,
        }
    }

    /// Validate the payload and create a pending job.
    ///
    /// Nothing is written when validation fails.
    pub async fn init(&self, name: &str, spec: &JobSpec) -> Result<Job, LedgerError> {
        spec.validate()?;
        let payload = serde_json::to_value(spec)
            .map_err(|e| StoreError::Serialization(format!("spec payload: {e}")))?;

        let job = self.store.create(name, &payload).await?;
        info!(job_id = %job.id, name = %job.name, "Job created");
        Ok(job)
    }

    /// Fetch one job by id.
    pub async fn get(&self, id: Uuid) -> Result<Job, LedgerError> {
        self.store
            .get(id)
            .await?
            .ok_or(LedgerError::NotFound { id })
    }

    /// Claim the oldest pending job, moving it to RUNNING.
    pub async fn claim_next(&self) -> Result<Option<Job>, LedgerError> {
        Ok(self.queue.claim_next().await?)
    }

    /// Apply a consumer-reported status change.
    pub async fn update_status(
        &self,
        id: Uuid,
        new: JobStatus,
        message: &str,
    ) -> Result<Job, LedgerError> {
        self.transitions.update_status(id, new, message).await
    }

    /// Requeue running jobs whose consumer has been silent for `older_than`.
    ///
    /// Recovery path for crashed consumers; the server only calls it when
    /// explicitly enabled. Jobs move back to PENDING through the same
    /// conditional update that claims use, so a consumer report racing the
    /// sweep wins cleanly and the job is left alone.
    pub async fn requeue_stale(
        &self,
        older_than: std::time::Duration,
    ) -> Result<usize, LedgerError> {
        let age = chrono::Duration::from_std(older_than)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        let cutoff = Utc::now() - age;

        let stale = self.store.list_stale_running(cutoff).await?;
        let mut requeued = 0;
        for job in stale {
            match self
                .store
                .compare_and_transition(
                    job.id,
                    JobStatus::Running,
                    JobStatus::Pending,
                    "requeued after consumer silence",
                )
                .await?
            {
                CasOutcome::Updated(_) => {
                    warn!(job_id = %job.id, name = %job.name, "Requeued stale running job");
                    requeued += 1;
                }
                CasOutcome::Conflict { actual } => {
                    debug!(job_id = %job.id, status = %actual, "Stale job advanced before requeue");
                }
                CasOutcome::Missing => {}
            }
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn beam_spec(model_name: &str) -> JobSpec {
        serde_json::from_value(json!({
            "model_name": model_name,
            "test_type": "CantileverBeam",
            "geometry": { "length_m": 1.0, "width_m": 0.1, "height_m": 0.05 },
            "material": { "name": "Steel", "youngs_modulus_pa": 210e9, "poisson_ratio": 0.3 },
            "loading": { "tip_load_n": -500.0 },
            "discretization": { "elements_length": 20, "elements_width": 4, "elements_height": 2 }
        }))
        .unwrap()
    }

    fn ledger_with_store() -> (JobLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (JobLedger::new(store.clone()), store)
    }

    #[tokio::test]
    async fn init_round_trips_the_spec() {
        let (ledger, _) = ledger_with_store();
        let spec = beam_spec("cantilever_demo");

        let job = ledger.init("beam1", &spec).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.log.is_empty());

        let fetched = ledger.get(job.id).await.unwrap();
        let parsed: JobSpec = serde_json::from_value(fetched.spec).unwrap();
        assert_eq!(parsed, spec);
    }

    #[tokio::test]
    async fn invalid_spec_creates_nothing() {
        let (ledger, store) = ledger_with_store();
        let mut spec = beam_spec("cantilever_demo");
        spec.material.poisson_ratio = 0.7;

        let err = ledger.init("beam1", &spec).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_unknown_job_is_not_found() {
        let (ledger, _) = ledger_with_store();
        let err = ledger.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn job_lifecycle_end_to_end() {
        let (ledger, _) = ledger_with_store();
        let created = ledger.init("beam1", &beam_spec("cantilever_demo")).await.unwrap();

        let claimed = ledger.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, created.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.log.len(), 1);

        let completed = ledger
            .update_status(created.id, JobStatus::Completed, "solver finished")
            .await
            .unwrap();
        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.log.len(), 2);
        assert!(completed.log[1].ends_with("solver finished"));

        // Terminal means terminal.
        let err = ledger
            .update_status(created.id, JobStatus::Running, "retry")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        let fetched = ledger.get(created.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert_eq!(fetched.log.len(), 2);
    }

    #[tokio::test]
    async fn stale_sweep_requeues_silent_jobs() {
        let (ledger, _) = ledger_with_store();
        let created = ledger.init("beam1", &beam_spec("cantilever_demo")).await.unwrap();
        ledger.claim_next().await.unwrap().unwrap();

        // Zero threshold makes everything currently running stale.
        let requeued = ledger.requeue_stale(Duration::ZERO).await.unwrap();
        assert_eq!(requeued, 1);

        let fetched = ledger.get(created.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.log.len(), 2);
        assert!(fetched.log[1].ends_with("requeued after consumer silence"));

        // The requeued job is claimable again, exactly once.
        let reclaimed = ledger.claim_next().await.unwrap().unwrap();
        assert_eq!(reclaimed.id, created.id);
        assert!(ledger.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fresh_running_jobs_are_not_requeued() {
        let (ledger, _) = ledger_with_store();
        ledger.init("beam1", &beam_spec("cantilever_demo")).await.unwrap();
        ledger.claim_next().await.unwrap().unwrap();

        let requeued = ledger.requeue_stale(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(requeued, 0);
    }
}
