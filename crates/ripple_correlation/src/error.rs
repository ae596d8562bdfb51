//! Error types for incident correlation.

use thiserror::Error;

/// Errors that can occur when registering incidents.
#[derive(Debug, Error)]
pub enum Error {
    /// The incident request is missing required data.
    #[error("invalid incident: {0}")]
    InvalidIncident(String),

    /// A severity label did not match any known level.
    #[error("unknown severity: {0}")]
    UnknownSeverity(String),

    /// A root cause label did not match any known type.
    #[error("unknown root cause type: {0}")]
    UnknownRootCause(String),
}

/// Result type alias for correlation operations.
pub type Result<T> = std::result::Result<T, Error>;
