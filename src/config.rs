//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! unparseable.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::launcher::LauncherConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the destination registry database.
    pub registry_path: String,
    pub max_concurrent: usize,
    pub poll_interval: Duration,
    pub overwrite_existing: bool,
    pub poll_retry_budget: u32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `LAUNCHQ_REGISTRY` is required; everything else has defaults:
    /// `LAUNCHQ_MAX_CONCURRENT` (4), `LAUNCHQ_POLL_SECS` (120),
    /// `LAUNCHQ_OVERWRITE` (false), `LAUNCHQ_POLL_RETRIES` (3),
    /// `LOG_LEVEL` (info).
    pub fn from_env() -> Result<Self> {
        let max_concurrent: usize = parsed_var("LAUNCHQ_MAX_CONCURRENT", 4)?;
        if max_concurrent == 0 {
            return Err(Error::Config(
                "LAUNCHQ_MAX_CONCURRENT must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            registry_path: required_var("LAUNCHQ_REGISTRY")?,
            max_concurrent,
            poll_interval: Duration::from_secs(parsed_var("LAUNCHQ_POLL_SECS", 120)?),
            overwrite_existing: parsed_var("LAUNCHQ_OVERWRITE", false)?,
            poll_retry_budget: parsed_var("LAUNCHQ_POLL_RETRIES", 3)?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Launcher settings carried by this configuration.
    pub fn launcher(&self) -> LauncherConfig {
        LauncherConfig {
            max_concurrent: self.max_concurrent,
            poll_interval: self.poll_interval,
            overwrite_existing: self.overwrite_existing,
            poll_retry_budget: self.poll_retry_budget,
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}
