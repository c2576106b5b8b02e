//! Error types for the survey.
//!
//! Domain and store layers return [`SurveyError`]; the binary wraps them
//! in `anyhow` with context where it orchestrates whole flows.

use thiserror::Error;

/// Errors raised while collecting, storing or parsing responses.
#[derive(Error, Debug)]
pub enum SurveyError {
    /// A form field failed validation; the step does not advance.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation is not allowed in the wizard's current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A row from the backend could not be turned into a domain value.
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend answered with a non-success status.
    #[error("Backend error {status}: {body}")]
    Backend { status: u16, body: String },

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SurveyError {
    /// A "not found" lookup is an expected outcome, not a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SurveyError::NotFound(_))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SurveyError::Validation(msg.into())
    }
}

/// Result type alias for survey operations.
pub type Result<T> = std::result::Result<T, SurveyError>;
