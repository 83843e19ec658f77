//! The bounded launcher: admission-controlled launch loop.
//!
//! Keeps at most `max_concurrent` jobs outstanding. Capacity is always
//! derived from the registry's non-terminal rows, never from in-memory
//! bookkeeping alone, so a launch interrupted by a crash or stop signal can
//! be re-invoked with the same source and picks up where it left off.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::client::{JobClient, JobStatus};
use crate::error::{Error, Result};
use crate::model::{Alias, BatchId, JobState, Outcome, SubmissionRecord};
use crate::registry::Registry;
use crate::source::Source;

/// Configuration for the launch loop.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Ceiling on concurrently non-terminal jobs. Must be at least 1.
    pub max_concurrent: usize,
    /// Sleep between idle passes.
    pub poll_interval: Duration,
    /// Resubmit aliases that already have a registry row.
    pub overwrite_existing: bool,
    /// Transient poll failures tolerated per record before it is failed.
    pub poll_retry_budget: u32,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            poll_interval: Duration::from_secs(120),
            overwrite_existing: false,
            poll_retry_budget: 3,
        }
    }
}

/// Snapshot of outstanding submissions, loaded from the registry.
pub struct ActiveSet {
    records: Vec<SubmissionRecord>,
}

impl ActiveSet {
    /// Load the current non-terminal records.
    pub fn load(registry: &Registry) -> Result<Self> {
        Ok(Self {
            records: registry.list_active()?,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Admission slots left under the given ceiling.
    pub fn free_slots(&self, ceiling: usize) -> usize {
        ceiling.saturating_sub(self.records.len())
    }

    pub fn records(&self) -> &[SubmissionRecord] {
        &self.records
    }
}

/// State of one launch invocation.
pub struct Batch {
    pub id: BatchId,
    remaining: Source,
    /// source alias -> destination alias, for everything recorded so far.
    routed: BTreeMap<Alias, Alias>,
    /// Outcomes that could not be written to the registry.
    unrecorded: BTreeMap<Alias, Outcome>,
}

impl Batch {
    /// Validate the source and start a batch. Duplicate aliases are rejected
    /// here, before anything is submitted.
    pub fn new(source: Source) -> Result<Self> {
        source.validate()?;
        Ok(Self {
            id: BatchId::new(),
            remaining: source,
            routed: BTreeMap::new(),
            unrecorded: BTreeMap::new(),
        })
    }

    /// Items not yet attempted.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// True once the cursor is spent and everything this batch routed has
    /// reached a terminal state in the registry.
    pub fn is_settled(&self, registry: &Registry) -> Result<bool> {
        if !self.remaining.is_empty() {
            return Ok(false);
        }
        for dest in self.routed.values() {
            match registry.get(dest) {
                Ok(rec) if !rec.state.is_terminal() => return Ok(false),
                Ok(_) => {}
                // Row vanished under us (external delete) — nothing to wait for.
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

/// What one pass accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Items handed to the daemon this pass.
    pub submitted: usize,
    /// Records that reached a terminal state this pass.
    pub completed: usize,
    /// Non-terminal records after the pass.
    pub active: usize,
    /// Items still waiting for a free slot.
    pub remaining: usize,
}

/// Clonable stop signal for a running launch loop. Takes effect at the next
/// sleep point; the registry is never left half-written.
#[derive(Clone)]
pub struct StopHandle(Arc<Notify>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.notify_one();
    }
}

/// The bounded launcher. Owns the registry connection and the daemon client.
pub struct Launcher<C: JobClient> {
    registry: Registry,
    client: C,
    config: LauncherConfig,
    stop: Arc<Notify>,
}

impl<C: JobClient> Launcher<C> {
    /// Build a launcher. Rejects a zero ceiling before any callback can run.
    pub fn new(registry: Registry, client: C, config: LauncherConfig) -> Result<Self> {
        if config.max_concurrent == 0 {
            return Err(Error::Config(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            registry,
            client,
            config,
            stop: Arc::new(Notify::new()),
        })
    }

    /// Handle for stopping the launch loop between polls.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Drain a source to completion.
    ///
    /// Runs passes until every alias has a terminal outcome, sleeping
    /// `poll_interval` whenever a pass neither submitted nor completed
    /// anything. Returns one outcome per input alias; if the loop was
    /// stopped early the mapping covers only the aliases attempted so far,
    /// and re-invoking `launch` with the same source resumes the batch.
    pub async fn launch(&mut self, source: Source) -> Result<BTreeMap<Alias, Outcome>> {
        let mut batch = Batch::new(source)?;
        info!(
            batch = %batch.id,
            items = batch.remaining(),
            ceiling = self.config.max_concurrent,
            "launch starting"
        );

        loop {
            let report = self.pass(&mut batch)?;

            if batch.is_settled(&self.registry)? {
                break;
            }

            if report.submitted == 0 && report.completed == 0 {
                tokio::select! {
                    _ = self.stop.notified() => {
                        info!(batch = %batch.id, "stop requested, leaving launch loop");
                        break;
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        let outcomes = self.collect(&batch);
        info!(batch = %batch.id, entries = outcomes.len(), "launch finished");
        Ok(outcomes)
    }

    /// One admission + poll pass. The cooperative single-pass mode: callers
    /// who want control between polls re-invoke this until
    /// [`Batch::is_settled`] says the batch is done.
    pub fn pass(&mut self, batch: &mut Batch) -> Result<PassReport> {
        let submitted = self.admit(batch)?;
        let completed = self.poll_active()?;
        let active = self.registry.count_active()?;

        info!(
            batch = %batch.id,
            submitted,
            completed,
            active,
            remaining = batch.remaining(),
            "pass done"
        );

        Ok(PassReport {
            submitted,
            completed,
            active,
            remaining: batch.remaining(),
        })
    }

    /// Step 1: fill free slots from the cursor.
    fn admit(&mut self, batch: &mut Batch) -> Result<usize> {
        let active = ActiveSet::load(&self.registry)?;
        let mut free = active.free_slots(self.config.max_concurrent);
        let mut submitted = 0;

        while free > 0 {
            let Some((item, alias)) = batch.remaining.pop() else {
                break;
            };

            // Already recorded from an earlier run? Adopt it instead of
            // resubmitting — this is what makes a launch resumable. If it is
            // still non-terminal it was already counted by the active set.
            if !self.config.overwrite_existing {
                match self.registry.contains(&alias) {
                    Ok(true) => {
                        info!(alias = %alias, "already in registry, not resubmitting");
                        batch.routed.insert(alias.clone(), alias);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(alias = %alias, "registry read failed: {e}");
                        batch
                            .unrecorded
                            .insert(alias, Outcome::failed(format!("registry read failed: {e}")));
                        continue;
                    }
                }
            }

            match self.client.submit(&item, &alias) {
                Ok((handle, dest)) => {
                    info!(alias = %alias, destination = %dest, handle = %handle, "job submitted");
                    let record = SubmissionRecord::submitted(dest.clone(), batch.id, handle);
                    let write = if self.config.overwrite_existing {
                        self.registry.upsert(&record)
                    } else {
                        self.registry.insert(&record)
                    };
                    match write {
                        Ok(()) => {
                            batch.routed.insert(alias, dest);
                            free -= 1;
                            submitted += 1;
                        }
                        Err(e) => {
                            // The daemon owns the job now; all we can do is
                            // surface the failure for this alias and move on.
                            error!(alias = %alias, destination = %dest, "registry write failed: {e}");
                            batch.unrecorded.insert(
                                alias,
                                Outcome::failed(format!("registry write failed: {e}")),
                            );
                        }
                    }
                }
                Err(e) => {
                    let err = Error::Submission {
                        alias: alias.clone(),
                        message: e.to_string(),
                    };
                    warn!("{err}");
                    let record = SubmissionRecord::failed(alias.clone(), batch.id, err.to_string());
                    match self.registry.upsert(&record) {
                        Ok(()) => {
                            batch.routed.insert(alias.clone(), alias);
                        }
                        Err(e2) => {
                            batch.unrecorded.insert(
                                alias,
                                Outcome::failed(format!("{err}; registry write failed: {e2}")),
                            );
                        }
                    }
                }
            }
        }

        Ok(submitted)
    }

    /// Step 2: poll every outstanding record and finalize the done ones.
    fn poll_active(&mut self) -> Result<usize> {
        let mut completed = 0;

        for rec in self.registry.list_active()? {
            let Some(handle) = rec.handle.clone() else {
                // Non-terminal row without a handle means a submission was
                // interrupted before the daemon's ticket was recorded.
                warn!(alias = %rec.alias, "active record has no job handle, failing it");
                if let Err(e) = self.registry.fail(&rec.alias, "no job handle recorded") {
                    error!(alias = %rec.alias, "registry write failed: {e}");
                } else {
                    completed += 1;
                }
                continue;
            };

            match self.client.poll(&handle) {
                Ok(JobStatus::Running) => {
                    if rec.state == JobState::Pending {
                        if let Err(e) = self.registry.update_state(&rec.alias, JobState::Running) {
                            error!(alias = %rec.alias, "registry write failed: {e}");
                        }
                    }
                    // A successful probe clears the budget: only consecutive
                    // failures count.
                    if rec.poll_failures > 0 {
                        if let Err(e) = self.registry.reset_poll_failures(&rec.alias) {
                            error!(alias = %rec.alias, "registry write failed: {e}");
                        }
                    }
                }
                Ok(JobStatus::Finished) => {
                    info!(alias = %rec.alias, handle = %handle, "job finished");
                    match self.registry.complete(&rec.alias) {
                        Ok(()) => completed += 1,
                        Err(e) => error!(alias = %rec.alias, "registry write failed: {e}"),
                    }
                }
                Ok(JobStatus::Failed { error: job_error }) => {
                    warn!(alias = %rec.alias, handle = %handle, "job failed: {job_error}");
                    match self.registry.fail(&rec.alias, &job_error) {
                        Ok(()) => completed += 1,
                        Err(e) => error!(alias = %rec.alias, "registry write failed: {e}"),
                    }
                }
                Err(e) => {
                    let failures = match self.registry.increment_poll_failures(&rec.alias) {
                        Ok(n) => n,
                        Err(e2) => {
                            error!(alias = %rec.alias, "registry write failed: {e2}");
                            continue;
                        }
                    };
                    if failures > self.config.poll_retry_budget {
                        let err = Error::Poll {
                            handle: handle.clone(),
                            message: format!("retries exhausted after {failures} attempts: {e}"),
                        };
                        error!(alias = %rec.alias, "{err}");
                        match self.registry.fail(&rec.alias, &err.to_string()) {
                            Ok(()) => completed += 1,
                            Err(e2) => error!(alias = %rec.alias, "registry write failed: {e2}"),
                        }
                    } else {
                        warn!(
                            alias = %rec.alias,
                            attempt = failures,
                            budget = self.config.poll_retry_budget,
                            "poll failed, will retry: {e}"
                        );
                    }
                }
            }
        }

        Ok(completed)
    }

    /// Read the final outcome for every alias this batch touched.
    fn collect(&self, batch: &Batch) -> BTreeMap<Alias, Outcome> {
        let mut out = BTreeMap::new();

        for (src, dest) in &batch.routed {
            let outcome = match self.registry.get(dest) {
                Ok(rec) => Outcome {
                    state: rec.state,
                    destination: Some(dest.clone()),
                    handle: rec.handle,
                    error: rec.error,
                },
                Err(e) => Outcome::failed(format!("registry read failed: {e}")),
            };
            out.insert(src.clone(), outcome);
        }

        for (src, outcome) in &batch.unrecorded {
            out.insert(src.clone(), outcome.clone());
        }

        out
    }
}
