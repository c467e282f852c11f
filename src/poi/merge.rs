//! Weighted merge of the web and vector branches
//!
//! Scores are weighted per branch and summed when the same POI shows up in
//! both. Deduplication keys on URL first, then poi_id, then title, so
//! web-only hits without an id still collapse correctly.

use std::collections::HashMap;

use tracing::debug;

use crate::config::SearchConfig;
use crate::domain::PoiCandidate;

/// Merges reranked branch results into one ranked list
pub struct ResultMerger {
    web_weight: f64,
    embedding_weight: f64,
}

impl ResultMerger {
    pub fn new(web_weight: f64, embedding_weight: f64) -> Self {
        Self {
            web_weight,
            embedding_weight,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.web_weight, config.embedding_weight)
    }

    /// Weighted combine, duplicate collapse, descending sort
    pub fn merge(&self, web_results: &[PoiCandidate], vector_results: &[PoiCandidate]) -> Vec<PoiCandidate> {
        let mut scored: HashMap<String, PoiCandidate> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for result in web_results {
            let key = result_key(result);
            let weighted = result.relevance * self.web_weight;
            match scored.get_mut(&key) {
                Some(existing) => existing.relevance += weighted,
                None => {
                    let mut copy = result.clone();
                    copy.relevance = weighted;
                    scored.insert(key.clone(), copy);
                    order.push(key);
                }
            }
        }

        for result in vector_results {
            let key = result_key(result);
            let weighted = result.relevance * self.embedding_weight;
            match scored.get_mut(&key) {
                Some(existing) => {
                    existing.relevance += weighted;
                    // The vector side always knows the id; adopt it
                    if existing.poi_id.is_none() {
                        existing.poi_id = result.poi_id.clone();
                    }
                }
                None => {
                    let mut copy = result.clone();
                    copy.relevance = weighted;
                    scored.insert(key.clone(), copy);
                    order.push(key);
                }
            }
        }

        let mut merged: Vec<PoiCandidate> = order
            .into_iter()
            .filter_map(|key| scored.remove(&key))
            .collect();
        merged.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));

        debug!(
            web = web_results.len(),
            vector = vector_results.len(),
            merged = merged.len(),
            "merge done"
        );
        merged
    }
}

/// Duplicate-collapse key: URL, then poi_id, then lowercased title
fn result_key(result: &PoiCandidate) -> String {
    if let Some(url) = &result.url {
        return url.clone();
    }
    if let Some(poi_id) = &result.poi_id {
        return format!("poi:{}", poi_id);
    }
    format!("title:{}", result.title.to_lowercase())
}
