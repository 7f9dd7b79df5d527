//! Typed HTTP client for the ledger REST API.
//!
//! Used by the runner binary; error shapes follow the server's contract,
//! so callers match on [`ClientError`] instead of raw status codes.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

use crate::error::ClientError;
use crate::job::{Job, JobStatus};
use crate::spec::JobSpec;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one ledger server.
#[derive(Clone)]
pub struct LedgerClient {
    base_url: String,
    http: reqwest::Client,
}

impl LedgerClient {
    /// Create a client for the given base URL, e.g. `http://127.0.0.1:8700`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url: String = base_url.into();
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Create a pending job from a validated spec.
    pub async fn init(&self, name: &str, spec: &JobSpec) -> Result<Job, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/jobs", self.base_url))
            .json(&json!({ "name": name, "spec": spec }))
            .send()
            .await?;

        match resp.status() {
            StatusCode::CREATED => Ok(resp.json().await?),
            StatusCode::UNPROCESSABLE_ENTITY => Err(ClientError::SpecRejected {
                detail: error_detail(resp).await,
            }),
            _ => Err(unexpected(resp).await),
        }
    }

    /// Fetch one job by id.
    pub async fn get(&self, id: Uuid) -> Result<Job, ClientError> {
        let resp = self
            .http
            .get(format!("{}/api/jobs/{id}", self.base_url))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound { id }),
            _ => Err(unexpected(resp).await),
        }
    }

    /// Claim the oldest pending job. `None` means the queue is empty.
    pub async fn claim_next(&self) -> Result<Option<Job>, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/jobs/claim", self.base_url))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(Some(resp.json().await?)),
            StatusCode::NO_CONTENT => Ok(None),
            _ => Err(unexpected(resp).await),
        }
    }

    /// Report a status change, appending `message` to the job's log.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        message: &str,
    ) -> Result<Job, ClientError> {
        let resp = self
            .http
            .put(format!("{}/api/jobs/{id}/status", self.base_url))
            .json(&json!({ "status": status, "message": message }))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound { id }),
            StatusCode::CONFLICT => Err(ClientError::TransitionRejected {
                detail: error_detail(resp).await,
            }),
            _ => Err(unexpected(resp).await),
        }
    }
}

/// Pull the `error` field out of an error body, falling back to raw text.
async fn error_detail(resp: reqwest::Response) -> String {
    let body = resp.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body)
}

async fn unexpected(resp: reqwest::Response) -> ClientError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ClientError::Unexpected { status, body }
}
