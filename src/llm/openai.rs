//! OpenAI-compatible API client
//!
//! Bearer-token authenticated provider with strict JSON-schema mode for
//! structured completions and SSE streaming.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::schema::{enforce_strict_objects, strip_json_fences};
use super::{LlmClient, LlmError, backoff_delay};
use crate::config::LlmConfig;

/// OpenAI-compatible API client
pub struct OpenAiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: Option<f64>,
    top_p: f64,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiClient {
    /// Create a new client from configuration.
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| LlmError::BadResponse(format!("API key not set: ${}", config.api_key_env)))?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            max_retries: config.max_retries,
            timeout,
        })
    }

    /// Build the chat completions request body
    fn build_request_body(&self, prompt: &str) -> Value {
        debug!(%self.model, "build_request_body: called");

        // Newer model families take max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "top_p": self.top_p,
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(self.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(self.max_tokens);
        }

        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        body
    }

    /// Send one chat request and extract `choices[0].message.content`
    async fn send_chat(&self, body: &Value) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(status, "send_chat: upstream error");
            return Err(LlmError::Upstream { status, message });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(format!("undecodable response: {}", e)))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::BadResponse("response carries no choices".to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(%self.model, prompt_len = prompt.len(), "complete: called");
        let body = self.build_request_body(prompt);

        let mut last_error = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(attempt);
                warn!(attempt, backoff_secs = backoff.as_secs(), "complete: retrying after transient error");
                tokio::time::sleep(backoff).await;
            }

            match self.send_chat(&body).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() => {
                    debug!(attempt, error = %e, "complete: retryable error");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::BadResponse("retry budget exhausted".to_string())))
    }

    async fn stream(&self, prompt: &str, chunk_tx: mpsc::Sender<String>) -> Result<String, LlmError> {
        debug!(%self.model, "stream: called");
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = self.build_request_body(prompt);
        body["stream"] = serde_json::json!(true);

        // Retry loop for establishing the connection
        let mut es = None;
        let mut last_error = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(attempt);
                warn!(attempt, backoff_secs = backoff.as_secs(), "stream: retrying connection");
                tokio::time::sleep(backoff).await;
            }

            let request = self.http.post(&url).bearer_auth(&self.api_key).json(&body);
            match EventSource::new(request) {
                Ok(event_source) => {
                    es = Some(event_source);
                    break;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "stream: EventSource creation failed");
                    last_error = Some(LlmError::BadResponse(e.to_string()));
                }
            }
        }

        let mut es = es.ok_or_else(|| {
            last_error.unwrap_or_else(|| LlmError::BadResponse("failed to open event stream".to_string()))
        })?;

        let mut full = String::new();
        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("stream: connection open");
                }
                Ok(Event::Message(msg)) => {
                    if msg.data.trim() == "[DONE]" {
                        debug!("stream: end-of-stream marker");
                        break;
                    }
                    let Ok(data) = serde_json::from_str::<Value>(&msg.data) else {
                        continue; // tolerate undecodable keepalive lines
                    };
                    if let Some(delta) = data["choices"][0]["delta"]["content"].as_str() {
                        if delta.is_empty() {
                            continue;
                        }
                        full.push_str(delta);
                        if chunk_tx.send(delta.to_string()).await.is_err() {
                            debug!("stream: consumer dropped, aborting");
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    es.close();
                    return Err(LlmError::BadResponse(e.to_string()));
                }
            }
        }
        es.close();

        Ok(full)
    }

    async fn complete_structured(&self, prompt: &str, schema: &Value) -> Result<Value, LlmError> {
        debug!(%self.model, "complete_structured: called");

        let mut strict_schema = schema.clone();
        enforce_strict_objects(&mut strict_schema);

        let mut body = self.build_request_body(prompt);
        body["response_format"] = serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": "response",
                "strict": true,
                "schema": strict_schema,
            }
        });

        let mut last_error = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(attempt);
                warn!(attempt, backoff_secs = backoff.as_secs(), "complete_structured: retrying");
                tokio::time::sleep(backoff).await;
            }

            let content = match self.send_chat(&body).await {
                Ok(content) => content,
                Err(e) if e.is_retryable() => {
                    debug!(attempt, error = %e, "complete_structured: retryable transport error");
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match serde_json::from_str(strip_json_fences(&content)) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(attempt, error = %e, "complete_structured: malformed JSON, retrying");
                    last_error = Some(LlmError::SchemaViolation(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::BadResponse("retry budget exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient {
            model: "gpt-5-mini".to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            http: Client::new(),
            max_tokens: 4096,
            temperature: None,
            top_p: 0.9,
            max_retries: 3,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_request_body_uses_completion_tokens_for_new_models() {
        let body = client().build_request_body("hello");
        assert_eq!(body["max_completion_tokens"], 4096);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_request_body_uses_max_tokens_for_older_models() {
        let mut c = client();
        c.model = "gpt-4o".to_string();
        c.temperature = Some(0.7);

        let body = c.build_request_body("hello");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
