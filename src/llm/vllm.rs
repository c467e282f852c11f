//! vLLM-compatible API client
//!
//! Unauthenticated provider for self-hosted inference servers. Structured
//! completions use the server's guided-decoding flag instead of a strict
//! schema mode. A 503 (server busy) is always retried with backoff.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::schema::strip_json_fences;
use super::{LlmClient, LlmError, backoff_delay};
use crate::config::LlmConfig;

/// vLLM-compatible API client
pub struct VllmClient {
    base_url: String,
    http: Client,
    max_tokens: u32,
    temperature: Option<f64>,
    top_p: f64,
    max_retries: u32,
    timeout: Duration,
}

impl VllmClient {
    /// Create a new client from configuration. No API key is involved.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            max_retries: config.max_retries,
            timeout,
        })
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        let mut body = serde_json::json!({
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.max_tokens,
            "top_p": self.top_p,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }

    async fn send_chat(&self, body: &Value) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
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
impl LlmClient for VllmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(prompt_len = prompt.len(), "complete: called");
        let body = self.build_request_body(prompt);

        let mut last_error = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(attempt);
                warn!(attempt, backoff_secs = backoff.as_secs(), "complete: retrying");
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
        debug!("stream: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut body = self.build_request_body(prompt);
        body["stream"] = serde_json::json!(true);

        let mut last_error = None;
        'attempts: for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(attempt);
                warn!(attempt, backoff_secs = backoff.as_secs(), "stream: retrying");
                tokio::time::sleep(backoff).await;
            }

            let response = match self.http.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::from_reqwest(e, self.timeout));
                    continue;
                }
            };

            let status = response.status().as_u16();
            if status == 503 {
                // server busy, always worth another attempt
                debug!(attempt, "stream: 503, backing off");
                last_error = Some(LlmError::Upstream {
                    status,
                    message: "server busy".to_string(),
                });
                continue;
            }
            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::Upstream { status, message });
            }

            // The guided endpoint emits bare `data: {json}` lines rather than
            // well-formed SSE events, so split the byte stream by newline.
            let mut full = String::new();
            let mut buf: Vec<u8> = Vec::new();
            let mut byte_stream = response.bytes_stream();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        last_error = Some(LlmError::from_reqwest(e, self.timeout));
                        continue 'attempts;
                    }
                };
                buf.extend_from_slice(&chunk);

                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data.trim() == "[DONE]" {
                        return Ok(full);
                    }
                    let Ok(value) = serde_json::from_str::<Value>(data) else {
                        continue;
                    };
                    if let Some(delta) = value["choices"][0]["delta"]["content"].as_str() {
                        if delta.is_empty() {
                            continue;
                        }
                        full.push_str(delta);
                        if chunk_tx.send(delta.to_string()).await.is_err() {
                            debug!("stream: consumer dropped, aborting");
                            return Ok(full);
                        }
                    }
                }
            }

            // Natural end of stream without the [DONE] marker
            return Ok(full);
        }

        Err(last_error.unwrap_or_else(|| LlmError::BadResponse("retry budget exhausted".to_string())))
    }

    async fn complete_structured(&self, prompt: &str, schema: &Value) -> Result<Value, LlmError> {
        debug!("complete_structured: called");
        let mut body = self.build_request_body(prompt);
        body["guided_json"] = schema.clone();

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
