//! Status-change validation and application.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::job::{Job, JobStatus};
use crate::store::{CasOutcome, JobStore};

/// Applies consumer-reported status changes against the transition table.
///
/// `PENDING -> RUNNING` is reserved for the claim path and rejected here, so
/// a consumer cannot start a job without going through the queue.
pub struct TransitionEngine {
    store: Arc<dyn JobStore>,
}

impl TransitionEngine {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Move the job to `new`, appending `message` to its log.
    ///
    /// If another writer changes the job between our read and the
    /// conditional update, the edge is re-validated against the fresh
    /// status and retried once. Callers only ever see success,
    /// `NotFound`, or `InvalidTransition`.
    pub async fn update_status(
        &self,
        id: Uuid,
        new: JobStatus,
        message: &str,
    ) -> Result<Job, LedgerError> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or(LedgerError::NotFound { id })?;

        let mut expected = job.status;
        for attempt in 0..2 {
            if !update_edge_allowed(expected, new) {
                return Err(LedgerError::InvalidTransition {
                    id,
                    from: expected,
                    to: new,
                });
            }

            match self
                .store
                .compare_and_transition(id, expected, new, message)
                .await?
            {
                CasOutcome::Updated(job) => {
                    debug!(job_id = %id, from = %expected, to = %new, "Status updated");
                    return Ok(job);
                }
                CasOutcome::Conflict { actual } => {
                    debug!(
                        job_id = %id,
                        expected = %expected,
                        actual = %actual,
                        attempt,
                        "Concurrent status change, revalidating"
                    );
                    expected = actual;
                }
                CasOutcome::Missing => return Err(LedgerError::NotFound { id }),
            }
        }

        Err(LedgerError::InvalidTransition {
            id,
            from: expected,
            to: new,
        })
    }
}

/// Edges reachable through `update_status`. The claim edge is excluded:
/// only the queue coordinator may move a job from PENDING to RUNNING.
fn update_edge_allowed(from: JobStatus, to: JobStatus) -> bool {
    from.can_transition_to(to) && !(from == JobStatus::Pending && to == JobStatus::Running)
}
