//! Error types for scenario loading and validation.

use thiserror::Error;

/// Errors that can occur while loading or validating a scenario.
#[derive(Debug, Error)]
pub enum Error {
    /// The scenario is structurally valid but violates a semantic rule.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// A field holds a value outside its allowed range.
    #[error("invalid value for `{field}`: {message}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// The scenario file has an extension we cannot map to a format.
    #[error("unknown scenario format: {0}")]
    UnknownFormat(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Creates an invalid value error for the given field.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;
