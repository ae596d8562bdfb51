//! Error types for job orchestration.

use std::fmt;
use thiserror::Error;

/// Which ceiling rejected a start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    /// Running jobs across all owners.
    System,
    /// Running jobs of a single owner.
    Owner,
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("active jobs"),
            Self::Owner => f.write_str("jobs per user"),
        }
    }
}

/// Errors that can occur while managing jobs.
#[derive(Debug, Error)]
pub enum Error {
    /// A concurrency ceiling is already reached.
    #[error("maximum {scope} limit reached ({limit})")]
    OverLimit {
        /// The ceiling that was hit.
        scope: LimitScope,
        /// Its configured value.
        limit: usize,
    },

    /// No job with this id exists.
    #[error("job {0} not found")]
    NotFound(String),

    /// The job is not running.
    #[error("job {0} is not running")]
    NotRunning(String),

    /// The scenario failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ripple_model::Error),

    /// The telemetry sink could not be created.
    #[error("sink error: {0}")]
    Sink(#[from] ripple_otlp::Error),

    /// The incident request was rejected.
    #[error("incident error: {0}")]
    Incident(#[from] ripple_correlation::Error),
}

/// Result type alias for orchestration.
pub type Result<T> = std::result::Result<T, Error>;
