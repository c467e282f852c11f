//! Web search adapter
//!
//! Keyword → ranked hits. Missing credentials and upstream failures yield an
//! empty result rather than an error; the discovery pipeline must keep
//! moving on its other branch.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::domain::{PoiCandidate, PoiSource};

/// Keyword search over the open web
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Single query, up to `count` hits
    async fn search(&self, query: &str, count: usize) -> Vec<PoiCandidate>;

    /// Issue all queries concurrently, deduplicate by URL (first hit wins),
    /// sort by descending relevance
    async fn search_multi(&self, queries: &[String], per_query: usize) -> Vec<PoiCandidate> {
        if queries.is_empty() {
            return Vec::new();
        }

        let results = join_all(queries.iter().map(|q| self.search(q, per_query))).await;

        let mut seen_urls = std::collections::HashSet::new();
        let mut merged = Vec::new();
        for hits in results {
            for hit in hits {
                match &hit.url {
                    Some(url) => {
                        if seen_urls.insert(url.clone()) {
                            merged.push(hit);
                        }
                    }
                    None => merged.push(hit),
                }
            }
        }

        merged.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
        merged
    }
}

/// Tavily-style search API client
pub struct TavilySearch {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TavilySearch {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            warn!("web search API key not set; searches will return nothing");
        }
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.web_search_base_url.clone(), config.web_search_api_key())
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str, count: usize) -> Vec<PoiCandidate> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let Some(api_key) = &self.api_key else {
            return Vec::new();
        };

        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "max_results": count,
            "search_depth": "basic",
            "include_answer": false,
        });

        let response = match self.http.post(format!("{}/search", self.base_url)).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, query, "web search request failed");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), query, "web search upstream error");
            return Vec::new();
        }

        let data: Value = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, query, "undecodable web search response");
                return Vec::new();
            }
        };

        let hits: Vec<PoiCandidate> = data["results"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| PoiCandidate {
                        poi_id: None,
                        title: item["title"].as_str().unwrap_or_default().to_string(),
                        snippet: item["content"].as_str().unwrap_or_default().to_string(),
                        url: item["url"].as_str().map(str::to_string),
                        source: PoiSource::Web,
                        relevance: item["score"].as_f64().unwrap_or(0.0),
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(query, hits = hits.len(), "web search done");
        hits
    }
}
