//! Top-level engine errors
//!
//! The orchestrators degrade locally on almost every failure; the only ways
//! a run fails as a whole are total LLM unavailability during planning and
//! explicit cancellation.

use thiserror::Error;

use crate::llm::LlmError;

/// Errors surfaced by the orchestrators
#[derive(Debug, Error)]
pub enum EngineError {
    /// The LLM stayed unavailable through the retry budget at a point the
    /// pipeline cannot work around
    #[error("language model unavailable: {0}")]
    CoreUnavailable(#[source] LlmError),

    /// The request-scoped cancellation signal fired
    #[error("request cancelled")]
    Cancelled,
}
