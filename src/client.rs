//! Interface to the external execution daemon.
//!
//! The launcher holds exactly two capabilities: submit a work item, poll a
//! handle. Callers implement this against whatever daemon actually runs the
//! jobs; there is no ambient global connection.

use crate::error::Result;
use crate::model::{Alias, JobHandle, WorkItem};

/// Verdict from polling a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Still executing (or queued daemon-side).
    Running,
    /// Done successfully.
    Finished,
    /// The daemon reports the job in an error state.
    Failed { error: String },
}

/// Caller-supplied bridge to the job daemon.
pub trait JobClient {
    /// Submit one work item for execution.
    ///
    /// Returns the daemon's handle for the job plus the destination alias
    /// the outcome should be recorded under (usually the source alias, but
    /// the client may rename). The launcher calls this exactly once per
    /// source item; a returned error fails that alias without halting the
    /// batch.
    fn submit(&mut self, item: &WorkItem, alias: &Alias) -> Result<(JobHandle, Alias)>;

    /// Poll a previously submitted job.
    ///
    /// Errors are treated as transient and retried on the next pass, up to
    /// the launcher's poll retry budget.
    fn poll(&mut self, handle: &JobHandle) -> Result<JobStatus>;
}
