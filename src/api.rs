//! REST endpoints for the job ledger.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::job::JobStatus;
use crate::ledger::JobLedger;
use crate::spec::JobSpec;

/// Shared state for ledger routes.
#[derive(Clone)]
pub struct LedgerRouteState {
    pub ledger: Arc<JobLedger>,
}

/// Body for POST /api/jobs.
#[derive(Debug, Deserialize)]
pub struct InitJobRequest {
    pub name: String,
    pub spec: JobSpec,
}

/// Body for PUT /api/jobs/{id}/status.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: JobStatus,
    pub message: String,
}

/// POST /api/jobs
///
/// Validates the spec and creates a pending job. Returns 201 with the
/// full job record, or 422 when the spec violates its schema.
async fn init_job(
    State(state): State<LedgerRouteState>,
    Json(req): Json<InitJobRequest>,
) -> impl IntoResponse {
    match state.ledger.init(&req.name, &req.spec).await {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/jobs/{id}
///
/// Returns the job record, or 404 if the id is unknown.
async fn get_job(
    State(state): State<LedgerRouteState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.ledger.get(id).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/jobs/claim
///
/// Claims the oldest pending job and returns it already marked RUNNING.
/// Responds 204 when no job is pending.
async fn claim_job(State(state): State<LedgerRouteState>) -> impl IntoResponse {
    match state.ledger.claim_next().await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// PUT /api/jobs/{id}/status
///
/// Applies a consumer-reported status change, appending the message to the
/// job's log. Responds 409 when the transition is not allowed from the
/// job's current status.
async fn update_job_status(
    State(state): State<LedgerRouteState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> impl IntoResponse {
    match state.ledger.update_status(id, req.status, &req.message).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => error_response(e),
    }
}

/// Map a ledger error onto the HTTP surface.
fn error_response(err: LedgerError) -> Response {
    let status = match &err {
        LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::InvalidTransition { .. } => StatusCode::CONFLICT,
        LedgerError::Storage(_) => {
            error!(error = %err, "Request failed on storage");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

/// Build the ledger REST routes.
pub fn ledger_routes(state: LedgerRouteState) -> Router {
    Router::new()
        .route("/api/jobs", post(init_job))
        .route("/api/jobs/claim", post(claim_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/status", put(update_job_status))
        .with_state(state)
}
