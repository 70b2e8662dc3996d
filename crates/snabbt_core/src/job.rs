use std::fmt;

use chrono::{DateTime, Utc};

/// Prefix of job identifiers synthesized locally while the worker is offline.
pub const LOCAL_JOB_PREFIX: &str = "local-";

/// Opaque identifier of one remote automation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for identifiers created in fallback mode; the worker has never seen these.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_JOB_PREFIX)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status reported by the worker.
///
/// Unknown wire values are preserved in `Other` so the ready predicate can
/// still see the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Initializing,
    BrowserStarting,
    Running,
    Completed,
    Failed,
    Error,
    Cancelled,
    Other(String),
}

impl JobStatus {
    /// Parses a wire status, case-insensitively.
    pub fn from_wire(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "queued" | "pending" => JobStatus::Queued,
            "initializing" | "starting" => JobStatus::Initializing,
            "browser_starting" => JobStatus::BrowserStarting,
            "running" | "searching" => JobStatus::Running,
            "completed" | "success" | "booked" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "error" => JobStatus::Error,
            "cancelled" | "canceled" | "stopped" => JobStatus::Cancelled,
            _ => JobStatus::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Initializing => "initializing",
            JobStatus::BrowserStarting => "browser_starting",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Other(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Error | JobStatus::Cancelled
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known state of a job, as produced by a status poll or a push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Free-form substate label, e.g. `"bankid_waiting"`.
    pub stage: Option<String>,
    pub message: Option<String>,
    /// Percent complete, clamped to 0..=100.
    pub progress: Option<u8>,
    pub timestamp: DateTime<Utc>,
    /// Worker-side step counter; breaks ties between equal timestamps.
    pub step: Option<u64>,
    pub slots_found: u32,
    pub cycle_count: u32,
}

impl JobStatusSnapshot {
    pub fn new(job_id: JobId, status: JobStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status,
            stage: None,
            message: None,
            progress: None,
            timestamp,
            step: None,
            slots_found: 0,
            cycle_count: 0,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_step(mut self, step: u64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
