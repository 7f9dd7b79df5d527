//! Error types for the job ledger.

use uuid::Uuid;

use crate::job::JobStatus;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Spec error: {0}")]
    Spec(#[from] SpecError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Problems reading environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Job payload schema violations, reported before any record is created.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("Unsupported spec version {version} (expected {expected})")]
    UnsupportedVersion { version: u32, expected: u32 },

    #[error("model_name must not be empty")]
    EmptyModelName,

    #[error("{field} must be positive")]
    NonPositive { field: &'static str },

    #[error("poisson_ratio must be within 0.0..=0.5, got {value}")]
    PoissonOutOfRange { value: f64 },
}

/// Errors surfaced by the ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid job spec: {0}")]
    Validation(#[from] SpecError),

    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Errors from the HTTP client for the ledger API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job spec rejected: {detail}")]
    SpecRejected { detail: String },

    #[error("Transition rejected: {detail}")]
    TransitionRejected { detail: String },

    #[error("Unexpected response {status}: {body}")]
    Unexpected { status: u16, body: String },
}

/// Errors dispatching a job to the execution engine.
///
/// An engine that answers at all decides the job outcome through its HTTP
/// status; only failing to reach it is an error here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
