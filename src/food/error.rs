use std::time::Duration;
use thiserror::Error;

/// Failure talking to a remote service, before any domain interpretation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Service responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Transport failures, timeouts, 5xx and 429 may go away on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport(_) | ServiceError::Timeout(_) => true,
            ServiceError::Status { status, .. } => *status >= 500 || *status == 429,
            ServiceError::Malformed(_) => false,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ServiceError::Malformed(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Malformed(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Detector returned label index {index}, but label table {version} has only {size} labels")]
    UnknownLabel {
        index: u32,
        version: String,
        size: usize,
    },
    #[error("Detector uses label table {actual}, expected {expected}")]
    LabelVersionMismatch { expected: String, actual: String },
    #[error("Malformed detector response for {image}: {reason}")]
    Malformed { image: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("Cannot match recipes against an empty ingredient set")]
    EmptyIngredients,
    #[error("Result limit must be at least 1")]
    InvalidLimit,
    #[error("Malformed catalog response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("No recipe candidates to choose from")]
    NoCandidates,
    #[error("No recipe candidate matches {0}")]
    UnknownRecipe(String),
    #[error("Ingredients changed since the last recipe match, run the match again first")]
    StaleCandidates,
}
