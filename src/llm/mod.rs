//! LLM client module
//!
//! One trait, two provider variants. The variants differ only in request
//! shape (auth and structured-output mechanism); retries, backoff, and the
//! streaming contract are identical.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

pub mod client;
mod error;
mod openai;
pub mod schema;
mod vllm;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAiClient;
pub use vllm::VllmClient;

use crate::config::LlmConfig;

/// Backoff ceiling so late attempts do not sleep for minutes
const MAX_BACKOFF_SECS: u64 = 30;

/// Exponential backoff for retry `attempt` (1-based), capped
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS))
}

/// Create an LLM client for the provider named in config.
///
/// Supports "openai" (bearer auth, strict schema mode) and "vllm"
/// (unauthenticated, guided decoding).
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::from_config(config)?)),
        "vllm" => Ok(Arc::new(VllmClient::from_config(config)?)),
        other => Err(LlmError::BadResponse(format!(
            "unknown LLM provider: '{}'. Supported: openai, vllm",
            other
        ))),
    }
}
