//! Job lifecycle types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use weft_common::JobId;
use weft_protocol::JobManifest;

/// Lifecycle state of a job.
///
/// ```text
/// Submitted → Splitting → Dispatching → Collecting → Merging → Finalized
///                                        ↘ Failed (terminal)
///                                        ↘ Cancelled (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Splitting,
    Dispatching,
    Collecting,
    Merging,
    Finalized,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Finalized | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Submitted => "Submitted",
            JobState::Splitting => "Splitting",
            JobState::Dispatching => "Dispatching",
            JobState::Collecting => "Collecting",
            JobState::Merging => "Merging",
            JobState::Finalized => "Finalized",
            JobState::Failed => "Failed",
            JobState::Cancelled => "Cancelled",
        }
    }
}

/// Point-in-time view of a job, for status queries.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    /// Completed fraction in [0, 1].
    pub progress: f64,
    pub completed_chunks: u32,
    pub total_chunks: u32,
    /// Rough completion estimate from throughput so far.
    pub est_remaining_ms: Option<u64>,
}

impl JobStatus {
    pub(crate) fn initial() -> Self {
        Self {
            state: JobState::Submitted,
            progress: 0.0,
            completed_chunks: 0,
            total_chunks: 0,
            est_remaining_ms: None,
        }
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// One or more chunks exhausted their retry budget.
    ChunkRetriesExhausted,
    /// Redundant results never reached a majority.
    VerificationUnresolved,
    /// The job manifest failed splitting.
    BadManifest,
    /// The merge step failed.
    MergeFailed,
    /// Explicitly cancelled.
    Cancelled,
    Internal,
}

/// Reason payload attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: FailureKind,
    /// Human-readable detail.
    pub detail: String,
    /// Chunk indices that terminally failed, if any.
    pub failed_chunks: Vec<u32>,
}

/// Terminal outcome of a job. Partial results are not returned on
/// failure.
pub type JobOutcome = Result<Arc<Vec<u8>>, FailureInfo>;

/// What `get_result` observed.
#[derive(Debug, Clone)]
pub enum ResultFetch {
    /// Terminal success with the merged output.
    Ready(Arc<Vec<u8>>),
    /// The job has not reached a terminal state within the wait window.
    StillRunning,
    /// Terminal failure.
    Failed(FailureInfo),
}

/// A job as owned by its coordinator.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub manifest: JobManifest,
    /// Unix milliseconds when the job was admitted.
    pub submitted_at_ms: u64,
}
