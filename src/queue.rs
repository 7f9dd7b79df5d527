//! FIFO claim coordination on top of the store's conditional update.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::job::{self, Job, JobStatus};
use crate::store::{CasOutcome, JobStore};

/// Hands out pending jobs to polling consumers, oldest first.
///
/// There is no reservation step: a claim either returns a job already moved
/// to RUNNING or nothing, so a crashing consumer can never wedge the queue
/// between "handed out" and "marked running".
pub struct QueueCoordinator {
    store: Arc<dyn JobStore>,
}

impl QueueCoordinator {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Claim the oldest pending job, transitioning it to RUNNING.
    ///
    /// Losing a claim race moves on to the next-oldest candidate, and the
    /// pending snapshot is refreshed once exhausted. `None` means no job
    /// was pending at the time of the final listing.
    pub async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        loop {
            let pending = self.store.list_pending().await?;
            if pending.is_empty() {
                return Ok(None);
            }

            for candidate in pending {
                match self
                    .store
                    .compare_and_transition(
                        candidate.id,
                        JobStatus::Pending,
                        JobStatus::Running,
                        job::CLAIM_MESSAGE,
                    )
                    .await?
                {
                    CasOutcome::Updated(job) => {
                        debug!(job_id = %job.id, name = %job.name, "Job claimed");
                        return Ok(Some(job));
                    }
                    CasOutcome::Conflict { actual } => {
                        debug!(job_id = %candidate.id, status = %actual, "Lost claim race, trying next candidate");
                    }
                    CasOutcome::Missing => {
                        warn!(job_id = %candidate.id, "Pending job vanished during claim");
                    }
                }
            }
            // Every candidate was taken by someone else; list again.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures_util::future::join_all;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;
    use uuid::Uuid;

    async fn seeded_store(count: u32) -> (Arc<MemoryStore>, Vec<Uuid>) {
        let store = Arc::new(MemoryStore::new());
        let mut ids = Vec::new();
        for n in 0..count {
            let job = store
                .create(&format!("job-{n}"), &json!({ "model_name": format!("model-{n}") }))
                .await
                .unwrap();
            ids.push(job.id);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        (store, ids)
    }

    #[tokio::test]
    async fn empty_queue_yields_none() {
        let store = Arc::new(MemoryStore::new());
        let queue = QueueCoordinator::new(store);
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_come_out_oldest_first() {
        let (store, ids) = seeded_store(3).await;
        let queue = QueueCoordinator::new(store);

        for expected in &ids {
            let job = queue.claim_next().await.unwrap().unwrap();
            assert_eq!(job.id, *expected);
            assert_eq!(job.status, JobStatus::Running);
        }
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_records_a_log_entry() {
        let (store, _) = seeded_store(1).await;
        let queue = QueueCoordinator::new(store);

        let job = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(job.log.len(), 1);
        assert!(job.log[0].ends_with(job::CLAIM_MESSAGE));
    }

    #[tokio::test]
    async fn concurrent_claims_hand_out_each_job_once() {
        let (store, ids) = seeded_store(4).await;
        let queue = QueueCoordinator::new(store);

        let claims = join_all((0..16).map(|_| queue.claim_next())).await;

        let mut claimed = HashSet::new();
        let mut empty = 0;
        for claim in claims {
            match claim.unwrap() {
                Some(job) => {
                    assert!(claimed.insert(job.id), "job {} claimed twice", job.id);
                }
                None => empty += 1,
            }
        }
        assert_eq!(claimed.len(), ids.len());
        assert_eq!(empty, 16 - ids.len());
    }
}
