//! libSQL backend: durable `JobStore` on a local database file.
//!
//! The conditional transition is a single `UPDATE ... WHERE status = ?`
//! with a `RETURNING` clause, so the status check and the write happen
//! atomically inside SQLite regardless of how many server tasks race.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::{self, Job, JobStatus};
use crate::store::migrations;
use crate::store::{CasOutcome, JobStore};

/// libSQL job store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Job database opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn cell_err(e: libsql::Error) -> StoreError {
    StoreError::Query(format!("job row: {e}"))
}

/// Parse our canonical RFC 3339 write format back into a `DateTime<Utc>`.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

/// Map a libsql Row to a Job.
///
/// Column order matches JOB_COLUMNS:
/// 0:id, 1:name, 2:status, 3:spec, 4:log, 5:created_at, 6:last_updated
fn row_to_job(row: &libsql::Row) -> Result<Job, StoreError> {
    let id_str: String = row.get(0).map_err(cell_err)?;
    let name: String = row.get(1).map_err(cell_err)?;
    let status_str: String = row.get(2).map_err(cell_err)?;
    let spec_str: String = row.get(3).map_err(cell_err)?;
    let log_str: String = row.get(4).map_err(cell_err)?;
    let created_str: String = row.get(5).map_err(cell_err)?;
    let updated_str: String = row.get(6).map_err(cell_err)?;

    Ok(Job {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| StoreError::Serialization(format!("bad job id {id_str:?}: {e}")))?,
        name,
        status: status_str.parse().map_err(StoreError::Serialization)?,
        spec: serde_json::from_str(&spec_str)
            .map_err(|e| StoreError::Serialization(format!("bad spec payload: {e}")))?,
        log: serde_json::from_str(&log_str)
            .map_err(|e| StoreError::Serialization(format!("bad log array: {e}")))?,
        created_at: parse_timestamp(&created_str)?,
        last_updated: parse_timestamp(&updated_str)?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

const JOB_COLUMNS: &str = "id, name, status, spec, log, created_at, last_updated";

#[async_trait]
impl JobStore for LibSqlStore {
    async fn create(&self, name: &str, spec: &serde_json::Value) -> Result<Job, StoreError> {
        let job = Job::new(name, spec.clone());
        let spec_str = serde_json::to_string(&job.spec)
            .map_err(|e| StoreError::Serialization(format!("spec payload: {e}")))?;
        let created = job::format_timestamp(job.created_at);

        self.conn()
            .execute(
                "INSERT INTO jobs (id, name, status, spec, log, created_at, last_updated)
                 VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?6)",
                params![
                    job.id.to_string(),
                    job.name.clone(),
                    job.status.as_str(),
                    spec_str,
                    created.clone(),
                    created
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("create: {e}")))?;

        debug!(job_id = %job.id, name = %job.name, "Job inserted into DB");
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get: {e}"))),
        }
    }

    async fn list_pending(&self) -> Result<Vec<Job>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE status = 'PENDING'
                     ORDER BY created_at ASC, id ASC"
                ),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_pending: {e}")))?;

        let mut jobs = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => jobs.push(row_to_job(&row)?),
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("list_pending: {e}"))),
            }
        }
        Ok(jobs)
    }

    async fn compare_and_transition(
        &self,
        id: Uuid,
        expected: JobStatus,
        new: JobStatus,
        message: &str,
    ) -> Result<CasOutcome, StoreError> {
        let now = Utc::now();
        let entry = job::log_line(now, message);

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "UPDATE jobs
                     SET status = ?1, last_updated = ?2, log = json_insert(log, '$[#]', ?3)
                     WHERE id = ?4 AND status = ?5
                     RETURNING {JOB_COLUMNS}"
                ),
                params![
                    new.as_str(),
                    job::format_timestamp(now),
                    entry,
                    id.to_string(),
                    expected.as_str()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("compare_and_transition: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let job = row_to_job(&row)?;
                debug!(job_id = %id, from = %expected, to = %new, "Status transition applied");
                Ok(CasOutcome::Updated(job))
            }
            // The guard matched no row: either the status moved or the job
            // does not exist. One follow-up read says which.
            Ok(None) => match self.get(id).await? {
                Some(job) => Ok(CasOutcome::Conflict { actual: job.status }),
                None => Ok(CasOutcome::Missing),
            },
            Err(e) => Err(StoreError::Query(format!("compare_and_transition: {e}"))),
        }
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE status = 'RUNNING' AND last_updated < ?1
                     ORDER BY created_at ASC, id ASC"
                ),
                params![job::format_timestamp(cutoff)],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_stale_running: {e}")))?;

        let mut jobs = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => jobs.push(row_to_job(&row)?),
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("list_stale_running: {e}"))),
            }
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn test_store() -> LibSqlStore {
        LibSqlStore::new_memory().await.unwrap()
    }

    fn payload() -> serde_json::Value {
        json!({
            "model_name": "cantilever_demo",
            "test_type": "CantileverBeam",
            "geometry": { "length_m": 1.0, "width_m": 0.1, "height_m": 0.05 }
        })
    }

    #[tokio::test]
    async fn insert_and_get_by_id() {
        let store = test_store().await;
        let created = store.create("beam1", &payload()).await.unwrap();

        let fetched = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name, "beam1");
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.spec, payload());
        assert!(fetched.log.is_empty());
    }

    #[tokio::test]
    async fn get_by_id_not_found() {
        let store = test_store().await;
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_listing_is_fifo() {
        let store = test_store().await;
        let mut ids = Vec::new();
        for n in 0..3 {
            let job = store.create(&format!("job-{n}"), &payload()).await.unwrap();
            ids.push(job.id);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        store
            .compare_and_transition(ids[0], JobStatus::Pending, JobStatus::Running, "claimed")
            .await
            .unwrap();

        let pending: Vec<Uuid> = store
            .list_pending()
            .await
            .unwrap()
            .iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(pending, vec![ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn conditional_update_applies_once() {
        let store = test_store().await;
        let job = store.create("beam1", &payload()).await.unwrap();

        let first = store
            .compare_and_transition(job.id, JobStatus::Pending, JobStatus::Running, "claimed")
            .await
            .unwrap();
        let updated = match first {
            CasOutcome::Updated(job) => job,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(updated.status, JobStatus::Running);
        assert_eq!(updated.log.len(), 1);
        assert!(updated.log[0].ends_with("claimed"));

        let second = store
            .compare_and_transition(job.id, JobStatus::Pending, JobStatus::Running, "claimed")
            .await
            .unwrap();
        match second {
            CasOutcome::Conflict { actual } => assert_eq!(actual, JobStatus::Running),
            other => panic!("expected conflict, got {other:?}"),
        }

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.log.len(), 1);
    }

    #[tokio::test]
    async fn conditional_update_on_unknown_id() {
        let store = test_store().await;
        let outcome = store
            .compare_and_transition(Uuid::new_v4(), JobStatus::Pending, JobStatus::Running, "claimed")
            .await
            .unwrap();
        assert!(matches!(outcome, CasOutcome::Missing));
    }

    #[tokio::test]
    async fn log_preserves_entry_order() {
        let store = test_store().await;
        let job = store.create("beam1", &payload()).await.unwrap();

        for (expected, new, message) in [
            (JobStatus::Pending, JobStatus::Running, "claimed"),
            (JobStatus::Running, JobStatus::Running, "meshing started"),
            (JobStatus::Running, JobStatus::Completed, "solver finished"),
        ] {
            store
                .compare_and_transition(job.id, expected, new, message)
                .await
                .unwrap();
        }

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert_eq!(fetched.log.len(), 3);
        assert!(fetched.log[0].ends_with("claimed"));
        assert!(fetched.log[1].ends_with("meshing started"));
        assert!(fetched.log[2].ends_with("solver finished"));
    }

    #[tokio::test]
    async fn stale_running_respects_cutoff() {
        let store = test_store().await;
        let job = store.create("beam1", &payload()).await.unwrap();
        store
            .compare_and_transition(job.id, JobStatus::Pending, JobStatus::Running, "claimed")
            .await
            .unwrap();

        let past = Utc::now() - chrono::Duration::minutes(5);
        assert!(store.list_stale_running(past).await.unwrap().is_empty());

        let future = Utc::now() + chrono::Duration::minutes(5);
        let stale = store.list_stale_running(future).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, job.id);
    }

    #[tokio::test]
    async fn reopen_preserves_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let store = LibSqlStore::new_local(&path).await.unwrap();
        let job = store.create("beam1", &payload()).await.unwrap();
        store
            .compare_and_transition(job.id, JobStatus::Pending, JobStatus::Running, "claimed")
            .await
            .unwrap();
        drop(store);

        let store = LibSqlStore::new_local(&path).await.unwrap();
        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "beam1");
        assert_eq!(fetched.status, JobStatus::Running);
        assert_eq!(fetched.log.len(), 1);
        assert_eq!(fetched.spec, payload());
    }
}
