//! Error types for the LangSmith filter

use crate::messages::Role;
use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for filter operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// Everything that can go wrong while tracing a chat turn.
///
/// None of these ever reach the pipeline: the hooks log and drop them.
#[derive(Error, Debug)]
pub enum FilterError {
    /// Invalid or placeholder configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The pipeline handed us something that is not a chat body
    #[error("invalid body: {0}")]
    InvalidBody(&'static str),

    /// No message with the wanted role, nothing to trace
    #[error("no {0} message found")]
    MissingMessage(Role),

    /// Network failure or timeout talking to the backend
    #[error("transport error: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    /// Backend answered with a non-2xx status
    #[error("{operation} failed with HTTP {status}")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Background dispatch needs a tokio runtime and the hook ran outside one
    #[error("{0} called outside of a tokio runtime, run not reported")]
    NoRuntime(&'static str),
}

impl FilterError {
    /// True for errors that only mean "there is nothing to trace".
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            FilterError::InvalidBody(_) | FilterError::MissingMessage(_)
        )
    }

    /// True for failures of the HTTP calls to the backend.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FilterError::Transport(_) | FilterError::Status { .. }
        )
    }
}
