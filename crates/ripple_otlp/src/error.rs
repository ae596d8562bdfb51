//! Error types for telemetry export.

use thiserror::Error;

/// Errors that can occur while exporting telemetry.
#[derive(Debug, Error)]
pub enum Error {
    /// The collector endpoint cannot be used.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The collector answered with a non-success status.
    #[error("collector rejected {signal} with status {status}: {body}")]
    Status {
        /// Signal being exported.
        signal: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The request could not be sent.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, Error>;
