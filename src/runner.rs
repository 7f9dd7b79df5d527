//! Polling consumer: claims jobs from the ledger and dispatches them to an
//! execution engine, reporting the terminal status back.
//!
//! The runner holds no job state of its own. If it dies mid-run the job
//! stays RUNNING in the ledger, where the server's stale sweep (when
//! enabled) can put it back in the queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::LedgerClient;
use crate::config::RunnerConfig;
use crate::error::EngineError;
use crate::job::{Job, JobStatus};

/// Result of one engine dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Completed { detail: String },
    Failed { detail: String },
}

/// Dispatch boundary to the execution engine.
///
/// `run` blocks until the engine has a verdict; simulations routinely take
/// minutes, so implementations carry their own generous timeouts.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn run(&self, job: &Job) -> Result<EngineOutcome, EngineError>;
}

/// Engine reached over HTTP: POST {base}/run with the job id and payload.
///
/// The engine's HTTP status is the verdict. 2xx means the solver finished,
/// anything else means it failed, with diagnostics in the body.
pub struct HttpEngine {
    base_url: String,
    http: reqwest::Client,
}

impl HttpEngine {
    pub fn new(
        base_url: impl Into<String>,
        dispatch_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let base_url: String = base_url.into();
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(dispatch_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl Engine for HttpEngine {
    async fn run(&self, job: &Job) -> Result<EngineOutcome, EngineError> {
        debug!(job_id = %job.id, "Dispatching job to engine");
        let resp = self
            .http
            .post(format!("{}/run", self.base_url))
            .json(&json!({ "job_id": job.id, "spec": job.spec }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if status.is_success() {
            Ok(EngineOutcome::Completed {
                detail: response_detail(&body),
            })
        } else {
            Ok(EngineOutcome::Failed {
                detail: format!(
                    "engine returned {}: {}",
                    status.as_u16(),
                    response_detail(&body)
                ),
            })
        }
    }
}

/// Pull the most useful diagnostic field out of an engine response body.
fn response_detail(body: &str) -> String {
    let extracted = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["stderr", "details", "message", "output"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|f| f.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string());

    if extracted.is_empty() {
        return "no detail from engine".to_string();
    }
    extracted.chars().take(200).collect()
}

/// Spawn the polling loop as a background task.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling;
/// a dispatch already in flight still runs to its terminal report.
pub fn spawn_runner(
    config: RunnerConfig,
    client: LedgerClient,
    engine: Arc<dyn Engine>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Runner started, polling every {}s against {}",
            config.poll_interval.as_secs(),
            config.ledger_url
        );

        let mut tick = tokio::time::interval(config.poll_interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Runner shutting down");
                return;
            }

            poll_once(&client, engine.as_ref()).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle: claim at most one job and see it through to a
/// terminal status.
pub async fn poll_once(client: &LedgerClient, engine: &dyn Engine) {
    let job = match client.claim_next().await {
        Ok(Some(job)) => job,
        Ok(None) => return,
        Err(e) => {
            warn!("Claim poll failed: {e}");
            return;
        }
    };

    info!(job_id = %job.id, name = %job.name, "Claimed job");
    process_job(client, engine, job).await;
}

/// Drive one claimed job through dispatch to COMPLETED or FAILED.
async fn process_job(client: &LedgerClient, engine: &dyn Engine, job: Job) {
    // Progress note; the job is already RUNNING from the claim.
    if let Err(e) = client
        .update_status(job.id, JobStatus::Running, "dispatched to engine")
        .await
    {
        warn!(job_id = %job.id, "Failed to record dispatch: {e}");
    }

    let (status, message) = match engine.run(&job).await {
        Ok(EngineOutcome::Completed { detail }) => (JobStatus::Completed, detail),
        Ok(EngineOutcome::Failed { detail }) => {
            warn!(job_id = %job.id, detail = %detail, "Engine reported failure");
            (JobStatus::Failed, detail)
        }
        Err(e) => {
            warn!(job_id = %job.id, "Engine unreachable: {e}");
            (JobStatus::Failed, format!("engine unreachable: {e}"))
        }
    };

    match client.update_status(job.id, status, &message).await {
        Ok(_) => info!(job_id = %job.id, status = %status, "Job finished"),
        Err(e) => warn!(job_id = %job.id, "Failed to report terminal status: {e}"),
    }
}
