//! Embedding pipeline
//!
//! The index consumes embeddings through the `Embedder` trait; the model
//! internals stay behind it. `HttpEmbedder` talks to an OpenAI-style
//! embeddings endpoint. `HashingEmbedder` is the deterministic fallback used
//! when no endpoint is configured, so the vector branch degrades instead of
//! failing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::IndexError;
use crate::config::IndexConfig;

/// Text → vector, for both documents and queries
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| IndexError::Embedding("embedding endpoint returned no vectors".to_string()))
    }
}

/// Client for an OpenAI-style `/embeddings` endpoint
pub struct HttpEmbedder {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), "embed_documents: called");

        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({ "model": self.model, "input": texts });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IndexError::Embedding(format!("embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(IndexError::Embedding(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| IndexError::Embedding(format!("undecodable embedding response: {}", e)))?;

        let items = data["data"]
            .as_array()
            .ok_or_else(|| IndexError::Embedding("embedding response carries no data".to_string()))?;

        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            let vector = item["embedding"]
                .as_array()
                .ok_or_else(|| IndexError::Embedding("embedding item carries no vector".to_string()))?
                .iter()
                .filter_map(Value::as_f64)
                .map(|v| v as f32)
                .collect();
            vectors.push(vector);
        }

        if vectors.len() != texts.len() {
            return Err(IndexError::Embedding(format!(
                "embedding count mismatch: {} texts, {} vectors",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase word hashes to a signed bucket; vectors are L2-normalized.
/// Crude but stable across processes, which is all the fallback needs.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.embedding_dim)
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];

        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let h = hasher.finish();

            let bucket = (h % self.dim as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
