//! Per-hit POI summarization
//!
//! Turns one raw search hit into a structured `PoiSummary` for places
//! validation. The prompt forbids mixing information across results; a hit
//! that names no concrete place is skipped.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use super::markup::{extract, extract_all};
use crate::domain::{PoiCandidate, PoiCategory, PoiSummary};
use crate::llm::LlmClient;

const SUMMARIZE_SINGLE_PROMPT: &str = "You are a travel search summarization expert.
A POI is a concrete place a traveler can visit. Extract the place described
by the search result below.

<persona>
{persona}
</persona>

<search_result>
<title>{title}</title>
<content>{snippet}</content>
<url>{url}</url>
</search_result>

Rules:
1. Use only information present in the search result.
2. Do not guess or assume; leave a field empty when the result is silent.
3. If the result does not describe a concrete place, return no poi block.
4. If the result describes several places, return one block per place.

Respond in this format:
<poi>
<name>exact place name</name>
<category>restaurant|cafe|attraction|accommodation|shopping|entertainment|other</category>
<description>objective description, 2-3 sentences, this place only</description>
<address>address, or empty if the result does not say</address>
<summary>why this traveler would enjoy it, 2-3 sentences</summary>
<highlights>feature 1, feature 2, feature 3</highlights>
</poi>";

/// Search hit → structured summary
pub struct InfoSummarizer {
    llm: Arc<dyn LlmClient>,
}

impl InfoSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Summarize one hit. Returns None when the LLM fails or the response
    /// names no place; the caller skips the hit either way.
    pub async fn summarize_single(&self, candidate: &PoiCandidate, persona: &str) -> Option<PoiSummary> {
        let prompt = SUMMARIZE_SINGLE_PROMPT
            .replace("{persona}", if persona.is_empty() { "not provided" } else { persona })
            .replace("{title}", &candidate.title)
            .replace("{snippet}", &candidate.snippet)
            .replace("{url}", candidate.url.as_deref().unwrap_or_default());

        let response = match self.llm.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(title = %candidate.title, error = %e, "summarize failed, skipping hit");
                return None;
            }
        };

        parse_poi_blocks(&response).into_iter().next()
    }
}

/// Parse every `<poi>` block in a response; blocks without a name are
/// dropped
fn parse_poi_blocks(response: &str) -> Vec<PoiSummary> {
    extract_all(response, "poi")
        .into_iter()
        .filter_map(parse_single_poi)
        .collect()
}

fn parse_single_poi(block: &str) -> Option<PoiSummary> {
    let name = extract(block, "name").filter(|n| !n.is_empty())?;

    let category = PoiCategory::parse(extract(block, "category").unwrap_or_default());
    let description = extract(block, "description").unwrap_or_default().to_string();
    let address = extract(block, "address").filter(|a| !a.is_empty()).map(str::to_string);
    let summary = extract(block, "summary").unwrap_or_default().to_string();
    let highlights = extract(block, "highlights")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();

    Some(PoiSummary {
        // Provisional until places validation assigns the URL-derived id
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        category,
        description,
        address,
        summary,
        highlights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PoiSource;
    use crate::llm::client::mock::MockLlmClient;

    const RESPONSE: &str = "<poi>
<name>Euljiro Snail Alley</name>
<category>restaurant</category>
<description>Old printing-district alley of soju bars serving golbaengi.</description>
<address></address>
<summary>Fits a solo food tour around Euljiro.</summary>
<highlights>snails, soju, retro interior</highlights>
</poi>";

    fn candidate() -> PoiCandidate {
        PoiCandidate::new("Euljiro snail bars", "A guide to golbaengi alley", PoiSource::Web)
            .with_url("https://blog.example/euljiro")
    }

    #[tokio::test]
    async fn test_summarize_parses_block() {
        let llm = Arc::new(MockLlmClient::new().with_default_response(RESPONSE));
        let summarizer = InfoSummarizer::new(llm);

        let summary = summarizer.summarize_single(&candidate(), "solo foodie").await.unwrap();
        assert_eq!(summary.name, "Euljiro Snail Alley");
        assert_eq!(summary.category, PoiCategory::Restaurant);
        assert!(summary.address.is_none());
        assert_eq!(summary.highlights.len(), 3);
    }

    #[tokio::test]
    async fn test_nameless_block_is_skipped() {
        let llm = Arc::new(
            MockLlmClient::new().with_default_response("<poi><name></name><category>cafe</category></poi>"),
        );
        let summarizer = InfoSummarizer::new(llm);
        assert!(summarizer.summarize_single(&candidate(), "").await.is_none());
    }

    #[tokio::test]
    async fn test_llm_failure_yields_none() {
        let llm = Arc::new(MockLlmClient::new().failing_completions());
        let summarizer = InfoSummarizer::new(llm);
        assert!(summarizer.summarize_single(&candidate(), "").await.is_none());
    }

    #[test]
    fn test_multiple_blocks_first_wins_via_caller() {
        let response = format!("{}\n<poi><name>Second Place</name></poi>", RESPONSE);
        let blocks = parse_poi_blocks(&response);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "Euljiro Snail Alley");
        assert_eq!(blocks[1].name, "Second Place");
    }

    #[test]
    fn test_unknown_category_lands_in_other() {
        let block = "<name>Somewhere</name><category>spa</category>";
        let summary = parse_single_poi(block).unwrap();
        assert_eq!(summary.category, PoiCategory::Other);
    }
}
