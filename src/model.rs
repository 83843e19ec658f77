//! Core data model.
//!
//! A work item is an opaque payload the caller wants executed somewhere else.
//! It travels with an alias — a human-assigned name, unique within one
//! destination namespace — and the registry tracks its submission lifecycle
//! under that alias.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Alias
// ---------------------------------------------------------------------------

/// Human-assigned name for a work item, unique within a destination namespace.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Alias(pub String);

impl Alias {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Alias {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Alias {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Job Handle
// ---------------------------------------------------------------------------

/// Opaque ticket for a job the external daemon is running.
///
/// The launcher never inspects it; it only hands it back to the client's
/// completion probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Batch Id
// ---------------------------------------------------------------------------

/// Identifies one launch invocation. Stamped on every registry row a batch
/// writes, so a monitoring reader can tell which run submitted what.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Job State
// ---------------------------------------------------------------------------

/// Lifecycle state of a submitted job, as recorded in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Submitted to the daemon, not yet observed running.
    Pending,
    /// The daemon reports the job as in progress.
    Running,
    /// Done successfully. Terminal.
    Finished,
    /// Submission or execution failed. Terminal.
    Failed,
}

impl JobState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Finished)   // finished before the first poll saw it run
                | (Pending, Failed)
                | (Running, Finished)
                | (Running, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work to hand to the submission client.
///
/// The payload is opaque: the launcher never interprets it, it only carries
/// it from the source to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub payload: serde_json::Value,
}

impl WorkItem {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

impl From<serde_json::Value> for WorkItem {
    fn from(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

// ---------------------------------------------------------------------------
// Submission Record
// ---------------------------------------------------------------------------

/// One registry row: the bookkeeping entry for a submitted (or failed) alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Destination alias the outcome is stored under.
    pub alias: Alias,

    /// Which launch invocation wrote this row. None for rows written by
    /// other tools sharing the registry.
    pub batch: Option<BatchId>,

    /// Daemon ticket for polling. None when the submission itself failed.
    pub handle: Option<JobHandle>,

    pub state: JobState,

    /// Error message for failed submissions or failed jobs.
    pub error: Option<String>,

    /// Consecutive completion-probe failures. Persisted so a retry budget
    /// survives a process restart.
    pub poll_failures: u32,

    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SubmissionRecord {
    /// Provisional row written right after the daemon accepted a job.
    pub fn submitted(alias: Alias, batch: BatchId, handle: JobHandle) -> Self {
        let now = Utc::now();
        Self {
            alias,
            batch: Some(batch),
            handle: Some(handle),
            state: JobState::Pending,
            error: None,
            poll_failures: 0,
            submitted_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Terminal row for an alias whose submission callback failed.
    pub fn failed(alias: Alias, batch: BatchId, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            alias,
            batch: Some(batch),
            handle: None,
            state: JobState::Failed,
            error: Some(error.into()),
            poll_failures: 0,
            submitted_at: now,
            updated_at: now,
            completed_at: Some(now),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Per-alias result in the mapping a launch returns, keyed by source alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Final observed state. Non-terminal only if the launch was stopped
    /// before the job completed.
    pub state: JobState,
    /// Destination alias the registry row lives under, when one was written.
    pub destination: Option<Alias>,
    pub handle: Option<JobHandle>,
    /// Captured error for failures.
    pub error: Option<String>,
}

impl Outcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: JobState::Failed,
            destination: None,
            handle: None,
            error: Some(error.into()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == JobState::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_accept_no_transitions() {
        for terminal in [JobState::Finished, JobState::Failed] {
            for to in [
                JobState::Pending,
                JobState::Running,
                JobState::Finished,
                JobState::Failed,
            ] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn pending_can_finish_without_being_seen_running() {
        assert!(JobState::Pending.can_transition_to(JobState::Finished));
        assert!(JobState::Pending.can_transition_to(JobState::Failed));
        assert!(JobState::Pending.can_transition_to(JobState::Running));
        assert!(!JobState::Running.can_transition_to(JobState::Pending));
    }

    #[test]
    fn batch_id_displays_short() {
        let id = BatchId::new();
        assert_eq!(id.to_string().len(), 8);
    }
}
