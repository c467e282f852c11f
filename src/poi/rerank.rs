//! Persona-based reranking
//!
//! The LLM scores each candidate against the persona in [0, 1]; results are
//! sorted by score and truncated. A list already within the cutoff is passed
//! through without an LLM call, and any failure passes through the original
//! top-n.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::PoiCandidate;
use crate::llm::LlmClient;

const RERANK_PROMPT: &str = "You are a travel POI relevance judge.

Score each search result below for how well it fits the traveler persona,
from 0.0 (irrelevant) to 1.0 (perfect fit). Consider taste, budget, and
travel style.

<persona>
{persona}
</persona>

<search_results>
{results}
</search_results>

Respond with one score per result, by result id:
<scores>
<score id=\"1\">0.85</score>
<score id=\"2\">0.40</score>
</scores>";

/// LLM-backed candidate reranker
pub struct Reranker {
    llm: Arc<dyn LlmClient>,
    top_n: usize,
}

impl Reranker {
    pub fn new(llm: Arc<dyn LlmClient>, top_n: usize) -> Self {
        Self { llm, top_n }
    }

    /// Rerank candidates against the persona, keeping the best `top_n`
    pub async fn rerank(&self, candidates: &[PoiCandidate], persona: &str) -> Vec<PoiCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }
        if candidates.len() <= self.top_n {
            // Nothing to cut; skip the LLM round-trip
            return candidates.to_vec();
        }

        let prompt = RERANK_PROMPT
            .replace("{persona}", persona)
            .replace("{results}", &format_results(candidates));

        let response = match self.llm.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "rerank failed, passing through original order");
                return candidates.iter().take(self.top_n).cloned().collect();
            }
        };

        let scores = parse_scores(&response, candidates.len());
        let mut scored: Vec<(f64, &PoiCandidate)> = scores.into_iter().zip(candidates).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let reranked: Vec<PoiCandidate> = scored
            .into_iter()
            .take(self.top_n)
            .map(|(score, candidate)| {
                let mut c = candidate.clone();
                c.relevance = score;
                c
            })
            .collect();

        debug!(input = candidates.len(), kept = reranked.len(), "rerank done");
        reranked
    }
}

fn format_results(candidates: &[PoiCandidate]) -> String {
    let mut lines = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        lines.push(format!("<result id=\"{}\">", i + 1));
        lines.push(format!("  <title>{}</title>", candidate.title));
        let snippet: String = candidate.snippet.chars().take(200).collect();
        lines.push(format!("  <content>{}</content>", snippet));
        lines.push("</result>".to_string());
    }
    lines.join("\n")
}

/// Parse `<score id="N">v</score>` entries; absent ids stay 0, values are
/// clamped into [0, 1]
fn parse_scores(response: &str, count: usize) -> Vec<f64> {
    const OPEN: &str = "<score id=\"";

    let mut scores = vec![0.0f64; count];
    let mut rest = response;
    while let Some(pos) = rest.find(OPEN) {
        rest = &rest[pos + OPEN.len()..];

        let Some(quote) = rest.find('"') else {
            break;
        };
        let id = rest[..quote].trim().parse::<usize>();
        rest = &rest[quote..];

        let Some(start) = rest.find('>') else {
            break;
        };
        rest = &rest[start + 1..];
        let Some(end) = rest.find("</score>") else {
            break;
        };
        let value = rest[..end].trim().parse::<f64>();
        rest = &rest[end..];

        if let (Ok(id), Ok(value)) = (id, value) {
            if id >= 1 && id <= count {
                scores[id - 1] = value.clamp(0.0, 1.0);
            }
        }
    }
    scores
}
