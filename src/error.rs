//! Error types for the unscaffold library.

use crate::pipeline::StepResult;
use crate::step::Step;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for unscaffold operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for unscaffold library.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading configuration or input.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration value or combination.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The boundary oracle failed after retries.
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure modes of the external boundary oracle.
///
/// Every oracle failure surfaces as one of these variants; the client never panics on
/// a bad reply.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The service asked us to slow down.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The service answered with a server-side error status.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Network-level failure before a reply was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// A reply arrived but no usable fields could be extracted.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// No oracle is configured or it refuses to serve requests.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

impl OracleError {
    /// Returns true for failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Timeout | OracleError::RateLimited { .. } | OracleError::Transport(_) => {
                true
            }
            OracleError::Server { status, .. } => *status >= 500,
            OracleError::Auth(_) | OracleError::MalformedReply(_) | OracleError::Unavailable(_) => {
                false
            }
        }
    }
}

/// Pipeline-level failure.
///
/// A failed run still carries every step result completed before the failure and the
/// text as it stood after the last completed step.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration was rejected before any step ran.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The input could not be read, or the run was lost before it produced a result.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A step failed irrecoverably and the run was halted.
    #[error("step '{step}' failed after {} completed step(s): {source}", completed.len())]
    StepFailed {
        step: Step,
        #[source]
        source: Error,
        completed: Vec<StepResult>,
        text: String,
    },
}

impl PipelineError {
    /// Step results completed before the failure (empty for configuration errors).
    pub fn completed(&self) -> &[StepResult] {
        match self {
            PipelineError::InvalidConfig(_) | PipelineError::Io(_) => &[],
            PipelineError::StepFailed { completed, .. } => completed,
        }
    }

    /// The step that failed, if the run got that far.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            PipelineError::InvalidConfig(_) | PipelineError::Io(_) => None,
            PipelineError::StepFailed { step, .. } => Some(*step),
        }
    }
}
