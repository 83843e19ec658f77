//! # launchq
//!
//! Bounded-concurrency launcher for batches of externally executed jobs.
//!
//! Feeds (work item, alias) pairs to a caller-supplied submission client,
//! keeps at most N jobs in flight at any time, and records every alias's
//! outcome in a SQLite-backed registry. The launcher never runs jobs itself;
//! execution belongs to the external daemon, the launcher only admits and
//! polls.

pub mod client;
pub mod config;
pub mod error;
pub mod launcher;
pub mod model;
pub mod registry;
pub mod source;
pub mod telemetry;
