//! Migration job record and its state machine

use crate::error::{DataflowError, Result};
use crate::model::{Endpoint, Manifest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle state
///
/// ```text
/// queued -> initializing -> in_progress -> completed
///    |            |               |------> failed
///    |            |-> failed      '------> cancelled
///    '------------'-> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Initializing,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the job holds a worker slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initializing | Self::InProgress)
    }

    /// Legal edges of the state machine
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Initializing)
                | (Queued, Cancelled)
                | (Initializing, InProgress)
                | (Initializing, Failed)
                | (Initializing, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initializing => "initializing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job options supplied on submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Free-form label shown in listings
    pub label: Option<String>,
    /// Verify each copied file against its source
    pub verify: bool,
    /// Ask the executor to compress data in flight
    pub compress: bool,
    /// Override the planned batch size
    pub batch_size_bytes: Option<u64>,
    /// Override the coordinator's job timeout
    pub timeout_secs: Option<u64>,
}

/// A migration job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    /// Unique job ID
    pub id: String,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress_percent: f64,
    /// Source endpoint
    pub source: Endpoint,
    /// Destination endpoint
    pub destination: Endpoint,
    /// Files to move
    pub file_manifest: Manifest,
    /// Job options
    pub settings: JobSettings,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last state or progress change
    pub last_update_at: DateTime<Utc>,
    /// When the transfer began
    pub started_at: Option<DateTime<Utc>>,
    /// Set on completion
    pub completed_at: Option<DateTime<Utc>>,
    /// Set on failure
    pub failed_at: Option<DateTime<Utc>>,
    /// Set on cancellation
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Current throughput (bytes/sec)
    pub current_throughput: f64,
    /// Estimated time remaining (seconds)
    pub eta_seconds: Option<u64>,
    /// Failure reason, only populated when failed
    pub error: Option<String>,
    /// Total bytes in the manifest
    pub total_bytes: u64,
    /// Bytes moved so far
    pub bytes_transferred: u64,
    /// Files moved so far
    pub files_transferred: u64,
    /// Batches finished so far
    pub batches_completed: u64,
    /// Batches planned
    pub total_batches: u64,
}

impl MigrationJob {
    /// Create a queued job record
    pub fn new(
        id: impl Into<String>,
        source: Endpoint,
        destination: Endpoint,
        file_manifest: Manifest,
        settings: JobSettings,
    ) -> Self {
        let now = Utc::now();
        let total_bytes = file_manifest.total_bytes();
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            progress_percent: 0.0,
            source,
            destination,
            file_manifest,
            settings,
            created_at: now,
            last_update_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            current_throughput: 0.0,
            eta_seconds: None,
            error: None,
            total_bytes,
            bytes_transferred: 0,
            files_transferred: 0,
            batches_completed: 0,
            total_batches: 0,
        }
    }

    /// Generate a new job id: `mig_<utc timestamp>_<8 hex chars>`
    pub fn generate_id() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("mig_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
    }

    /// Move to `next`, stamping the matching timestamp
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DataflowError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            JobStatus::InProgress => self.started_at = Some(now),
            JobStatus::Completed => {
                self.completed_at = Some(now);
                self.progress_percent = 100.0;
                self.eta_seconds = Some(0);
            }
            JobStatus::Failed => self.failed_at = Some(now),
            JobStatus::Cancelled => self.cancelled_at = Some(now),
            JobStatus::Queued | JobStatus::Initializing => {}
        }
        if next.is_terminal() {
            self.current_throughput = 0.0;
        }

        self.status = next;
        self.last_update_at = now;
        Ok(())
    }

    /// Mark failed with a verbatim error message
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Whether the job reached a final state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time the job finished, whichever way it ended
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.failed_at).or(self.cancelled_at)
    }

    /// Seconds between the start of the transfer and its end (or now)
    pub fn elapsed_seconds(&self) -> Option<f64> {
        let start = self.started_at?;
        let end = self.finished_at().unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
    }
}
