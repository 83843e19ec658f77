//! Error types for launchq.

use thiserror::Error;

use crate::model::{Alias, JobHandle, JobState};

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid launcher configuration. Raised before any submission is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// The same alias appears more than once in a launch source.
    #[error("duplicate alias in source: {0}")]
    DuplicateAlias(Alias),

    /// A record already exists under this alias and overwrite was not requested.
    #[error("alias already exists in registry: {0}")]
    AliasExists(Alias),

    #[error("alias not found: {0}")]
    NotFound(Alias),

    #[error("invalid state transition for {alias}: {from} -> {to}")]
    InvalidTransition {
        alias: Alias,
        from: JobState,
        to: JobState,
    },

    /// The submission callback failed for one work item.
    #[error("submission failed for {alias}: {message}")]
    Submission { alias: Alias, message: String },

    /// The completion probe failed for an outstanding job.
    #[error("poll failed for job {handle}: {message}")]
    Poll { handle: JobHandle, message: String },

    #[error("registry error: {0}")]
    Registry(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
