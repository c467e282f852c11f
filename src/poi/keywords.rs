//! Keyword extraction from the traveler persona

use std::sync::Arc;

use tracing::{debug, warn};

use super::markup::extract_all;
use crate::llm::LlmClient;

const KEYWORD_EXTRACTION_PROMPT: &str = "You are a travel keyword extraction expert.

Analyze the traveler persona below and produce POI search keywords this
traveler is likely to respond to.

<persona>
{persona}
</persona>

<destination>{destination}</destination>

Guidelines:
- Consider the persona's travel style, tastes, budget, and companions
- Include the destination in each keyword so searches stay local
- Produce 5-10 short keywords covering several categories
  (restaurants, cafes, attractions, shopping, nightlife)

Respond in this format:
<keywords>
<keyword>Seoul solo-friendly restaurants</keyword>
<keyword>Euljiro craft beer bars</keyword>
</keywords>";

/// Most keywords kept from one extraction
const MAX_KEYWORDS: usize = 10;

/// Persona → search keywords
pub struct KeywordExtractor {
    llm: Arc<dyn LlmClient>,
}

impl KeywordExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Extract search keywords. An empty persona yields no keywords; an LLM
    /// failure (or unusable response) degrades to the destination alone so
    /// discovery can still run.
    pub async fn extract(&self, persona: &str, destination: &str) -> Vec<String> {
        if persona.trim().is_empty() {
            return Vec::new();
        }

        let prompt = KEYWORD_EXTRACTION_PROMPT
            .replace("{persona}", persona)
            .replace("{destination}", destination);

        let response = match self.llm.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "keyword extraction failed, falling back to destination");
                return vec![destination.to_string()];
            }
        };

        let keywords: Vec<String> = extract_all(&response, "keyword")
            .into_iter()
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .take(MAX_KEYWORDS)
            .collect();

        if keywords.is_empty() {
            warn!("keyword extraction produced no usable keywords, falling back to destination");
            return vec![destination.to_string()];
        }

        debug!(count = keywords.len(), "extracted keywords");
        keywords
    }
}
