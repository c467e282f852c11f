//! LLM client trait
//!
//! One uniform async interface over the provider variants: whole-response
//! completion, chunked streaming, and JSON-schema-constrained completion.
//! Providers differ only in request shape; retry and backoff behavior is
//! part of the contract.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::LlmError;

/// Uniform async interface to an LLM provider
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Whole response for a prompt
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Stream response chunks into `chunk_tx`, returning the assembled
    /// response. The stream is finite and not restartable; a dropped
    /// receiver stops the stream early and aborts the underlying request.
    async fn stream(&self, prompt: &str, chunk_tx: mpsc::Sender<String>) -> Result<String, LlmError>;

    /// Completion constrained by a JSON schema. The response is stripped of
    /// markdown fences and parsed; malformed JSON is retried as a
    /// `SchemaViolation` within the provider's retry budget.
    async fn complete_structured(&self, prompt: &str, schema: &Value) -> Result<Value, LlmError>;
}

/// Scriptable in-process client for tests
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::{LlmClient, LlmError};

    /// Mock LLM client.
    ///
    /// Plain completions are answered by substring rules (first match wins)
    /// so concurrent callers get deterministic responses regardless of
    /// interleaving. Structured completions pop a scripted queue in order,
    /// which models the planner's iteration sequence.
    #[derive(Default)]
    pub struct MockLlmClient {
        rules: Vec<(String, String)>,
        default_response: Option<String>,
        structured: Mutex<VecDeque<Value>>,
        fail_completions: bool,
        completion_calls: AtomicUsize,
        structured_calls: AtomicUsize,
    }

    impl MockLlmClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer any prompt containing `pattern` with `response`
        pub fn respond_when(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
            self.rules.push((pattern.into(), response.into()));
            self
        }

        /// Response for prompts no rule matches (otherwise they error)
        pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
            self.default_response = Some(response.into());
            self
        }

        /// Make every plain completion fail as an upstream 503
        pub fn failing_completions(mut self) -> Self {
            self.fail_completions = true;
            self
        }

        /// Queue a structured response; popped in FIFO order
        pub fn push_structured(&self, value: Value) {
            self.structured.lock().unwrap().push_back(value);
        }

        pub fn completion_calls(&self) -> usize {
            self.completion_calls.load(Ordering::SeqCst)
        }

        pub fn structured_calls(&self) -> usize {
            self.structured_calls.load(Ordering::SeqCst)
        }

        fn resolve(&self, prompt: &str) -> Result<String, LlmError> {
            if self.fail_completions {
                return Err(LlmError::Upstream {
                    status: 503,
                    message: "mock unavailable".to_string(),
                });
            }
            for (pattern, response) in &self.rules {
                if prompt.contains(pattern.as_str()) {
                    return Ok(response.clone());
                }
            }
            self.default_response
                .clone()
                .ok_or_else(|| LlmError::BadResponse(format!("no mock rule matches prompt: {:.80}", prompt)))
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            self.completion_calls.fetch_add(1, Ordering::SeqCst);
            self.resolve(prompt)
        }

        async fn stream(&self, prompt: &str, chunk_tx: mpsc::Sender<String>) -> Result<String, LlmError> {
            let full = self.resolve(prompt)?;
            for chunk in full.split_inclusive(' ') {
                if chunk_tx.send(chunk.to_string()).await.is_err() {
                    break; // consumer stopped early
                }
            }
            Ok(full)
        }

        async fn complete_structured(&self, _prompt: &str, _schema: &Value) -> Result<Value, LlmError> {
            self.structured_calls.fetch_add(1, Ordering::SeqCst);
            self.structured.lock().unwrap().pop_front().ok_or(LlmError::Upstream {
                status: 503,
                message: "mock structured queue empty".to_string(),
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_rules_match_by_substring() {
            let mock = MockLlmClient::new()
                .respond_when("keywords", "<keywords><keyword>a</keyword></keywords>")
                .with_default_response("fallback");

            let hit = mock.complete("extract keywords from this persona").await.unwrap();
            assert!(hit.contains("<keyword>"));

            let miss = mock.complete("something else").await.unwrap();
            assert_eq!(miss, "fallback");
        }

        #[tokio::test]
        async fn test_structured_queue_pops_in_order() {
            let mock = MockLlmClient::new();
            mock.push_structured(serde_json::json!({"n": 1}));
            mock.push_structured(serde_json::json!({"n": 2}));

            let schema = serde_json::json!({"type": "object"});
            assert_eq!(mock.complete_structured("p", &schema).await.unwrap()["n"], 1);
            assert_eq!(mock.complete_structured("p", &schema).await.unwrap()["n"], 2);
            assert!(mock.complete_structured("p", &schema).await.is_err());
            assert_eq!(mock.structured_calls(), 3);
        }

        #[tokio::test]
        async fn test_stream_reassembles() {
            let mock = MockLlmClient::new().with_default_response("one two three");
            let (tx, mut rx) = mpsc::channel(16);
            let full = mock.stream("anything", tx).await.unwrap();
            assert_eq!(full, "one two three");

            let mut assembled = String::new();
            while let Some(chunk) = rx.recv().await {
                assembled.push_str(&chunk);
            }
            assert_eq!(assembled, full);
        }
    }
}
