//! LLM error types

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl LlmError {
    /// Classify a reqwest failure: timeouts become `Timeout`, everything
    /// else stays a `Network` error.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Network(err)
        }
    }

    /// Whether the retry loop should attempt this call again.
    ///
    /// 5xx (503 included), timeouts, connection errors, and malformed
    /// structured output are retryable; 4xx and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::Network(_) => true,
            LlmError::Upstream { status, .. } => *status >= 500 || *status == 429,
            LlmError::SchemaViolation(_) => true,
            LlmError::BadResponse(_) => false,
            LlmError::Cancelled => false,
        }
    }
}
