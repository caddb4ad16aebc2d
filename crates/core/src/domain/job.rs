// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::progress::{clamp_progress, COMPLETE};
use crate::domain::Snapshot;
use serde::{Deserialize, Serialize};

/// Job ID (UUID v4 in production)
pub type JobId = String;

/// Opaque key/value bag captured at job creation.
///
/// Owned by the caller; the core stores it for audit/debugging and never
/// interprets its contents.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Job Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and Failed are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    // Pending < Running < {Completed, Failed}
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producer label (e.g. "telegram", "jsonl"), used for observability and
/// for picking the producer source at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKind(String);

impl JobKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One tracked extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,

    /// Always within 0..=100
    pub progress: u8,
    pub items_processed: u64,

    /// Append-only, in the order errors were recorded
    pub errors: Vec<String>,

    pub started_at: i64, // epoch ms
    pub finished_at: Option<i64>,

    pub parameters: Parameters,
}

impl Job {
    /// Create a new Pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `kind` - Producer label
    /// * `parameters` - Request parameters, stored verbatim
    /// * `started_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        kind: JobKind,
        parameters: Parameters,
        started_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            items_processed: 0,
            errors: Vec::new(),
            started_at,
            finished_at: None,
            parameters,
        }
    }

    /// Pending -> Running -> {Completed, Failed}; Pending -> Failed is the
    /// only shortcut, for runs that never started
    fn check_transition(&self, to: JobStatus) -> Result<()> {
        let skips_running = to == JobStatus::Completed && self.status != JobStatus::Running;
        if self.status.is_terminal() || to.rank() < self.status.rank() || skips_running {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    fn set_status(&mut self, to: JobStatus, now_millis: i64) {
        self.status = to;
        if to.is_terminal() {
            self.finished_at = Some(now_millis);
        }
    }

    /// Apply a progress report from the owning orchestrator.
    ///
    /// `progress` is clamped into 0..=100; `new_errors` are appended.
    pub fn record_progress(
        &mut self,
        status: JobStatus,
        progress: i64,
        items_processed: u64,
        new_errors: Vec<String>,
        now_millis: i64,
    ) -> Result<()> {
        self.check_transition(status)?;
        self.progress = if status == JobStatus::Completed {
            COMPLETE
        } else {
            clamp_progress(progress)
        };
        self.items_processed = items_processed;
        self.errors.extend(new_errors);
        self.set_status(status, now_millis);
        Ok(())
    }

    /// Transition to Completed; progress is forced to 100
    pub fn complete(&mut self, items_processed: u64, now_millis: i64) -> Result<()> {
        self.check_transition(JobStatus::Completed)?;
        self.progress = COMPLETE;
        self.items_processed = items_processed;
        self.set_status(JobStatus::Completed, now_millis);
        Ok(())
    }

    /// Transition to Failed; progress and item count keep their last values
    pub fn fail(&mut self, error: impl Into<String>, now_millis: i64) -> Result<()> {
        self.check_transition(JobStatus::Failed)?;
        self.errors.push(error.into());
        self.set_status(JobStatus::Failed, now_millis);
        Ok(())
    }

    /// Serializable view without a delivery timestamp
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            items_processed: self.items_processed,
            errors: self.errors.clone(),
            timestamp: None,
        }
    }
}
