//! Job records and the status state machine.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log message recorded when a job is claimed.
pub const CLAIM_MESSAGE: &str = "claimed";

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Waiting in the queue for a consumer.
    Pending,
    /// Claimed by exactly one consumer and executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Aborted or finished with an error.
    Failed,
}

impl JobStatus {
    /// Check if this status allows transitioning to another status.
    ///
    /// `Running -> Running` is the progress-note edge: consumers use it to
    /// append a log entry without leaving the running state.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            // Claim
            (Pending, Running) |
            // Progress note
            (Running, Running) |
            // Terminal outcomes
            (Running, Completed) | (Running, Failed) |
            // Abort before any consumer picked it up
            (Pending, Failed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire and database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// One tracked unit of externally executed work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique id, assigned at creation, never reused.
    pub id: Uuid,
    /// Producer-supplied label; not unique.
    pub name: String,
    /// Current status.
    pub status: JobStatus,
    /// Opaque input payload, validated at the boundary and stored verbatim.
    pub spec: serde_json::Value,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation.
    pub last_updated: DateTime<Utc>,
    /// Append-only audit log, oldest entry first.
    pub log: Vec<String>,
}

impl Job {
    /// Create a fresh pending job with an empty log.
    pub fn new(name: impl Into<String>, spec: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: JobStatus::Pending,
            spec,
            created_at: now,
            last_updated: now,
            log: Vec::new(),
        }
    }
}

/// Canonical timestamp rendering: RFC 3339 UTC with fixed-width microseconds,
/// so lexicographic order equals chronological order in the database.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Render a log entry with its timestamp prefix.
pub fn log_line(at: DateTime<Utc>, message: &str) -> String {
    format!("[{}] {message}", format_timestamp(at))
}
