//! POI discovery pipeline
//!
//! Keyword extraction fans out into a parallel web branch (search →
//! summarize → validate → persist → rerank) and vector branch (similarity
//! search → rerank); the branches' `poi_data_map` writes rejoin under a
//! map-union reducer before the weighted merge.
//!
//! ```text
//! extract_keywords ──┬─► web_search ─► process_web_results ─► rerank_web ──┐
//!                    └─► vector_search ───────────────────► rerank_vector ─┤
//!                                                              merge_results ─► END
//! ```
//!
//! Per-hit failures (summaries that name no place, validation misses, index
//! write errors) skip the hit and never fail the run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod keywords;
mod markup;
mod merge;
mod rerank;
mod state;
mod summarize;

pub use keywords::KeywordExtractor;
pub use merge::ResultMerger;
pub use rerank::Reranker;
pub use state::{PoiState, merge_poi_data_map};
pub use summarize::InfoSummarizer;

use crate::config::SearchConfig;
use crate::domain::{PoiCandidate, PoiRecord};
use crate::error::EngineError;
use crate::index::VectorIndex;
use crate::llm::LlmClient;
use crate::search::{PoiMapper, WebSearch};

/// Concurrent per-hit processing slots in the web branch
const PROCESS_CONCURRENCY: usize = 5;

/// Output of one parallel branch, rejoined into the shared state
#[derive(Default)]
struct BranchOutput {
    results: Vec<PoiCandidate>,
    reranked: Vec<PoiCandidate>,
    poi_data: HashMap<String, PoiRecord>,
}

/// Persona + destination → validated POI records
pub struct PoiPipeline {
    web: Arc<dyn WebSearch>,
    mapper: Arc<dyn PoiMapper>,
    index: Arc<VectorIndex>,
    config: SearchConfig,
    cancel: CancellationToken,

    keyword_extractor: KeywordExtractor,
    summarizer: InfoSummarizer,
    reranker: Reranker,
    merger: ResultMerger,
}

impl PoiPipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        web: Arc<dyn WebSearch>,
        mapper: Arc<dyn PoiMapper>,
        index: Arc<VectorIndex>,
        config: SearchConfig,
    ) -> Self {
        Self {
            keyword_extractor: KeywordExtractor::new(llm.clone()),
            summarizer: InfoSummarizer::new(llm.clone()),
            reranker: Reranker::new(llm, config.rerank_top_n),
            merger: ResultMerger::from_config(&config),
            web,
            mapper,
            index,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a request-scoped cancellation token; cancelling it aborts all
    /// in-flight IO
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run discovery, returning the final validated records
    pub async fn run(&self, persona: &str, destination: &str) -> Result<Vec<PoiRecord>, EngineError> {
        Ok(self.run_state(persona, destination).await?.final_poi_data)
    }

    /// Run discovery, returning the full pipeline state for diagnostics
    pub async fn run_state(&self, persona: &str, destination: &str) -> Result<PoiState, EngineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            state = self.run_inner(persona, destination) => Ok(state),
        }
    }

    async fn run_inner(&self, persona: &str, destination: &str) -> PoiState {
        let mut state = PoiState::new(persona, destination);

        state.keywords = self.keyword_extractor.extract(persona, destination).await;
        if state.keywords.is_empty() {
            info!("no keywords extracted, discovery returns nothing");
            return state;
        }

        let keywords: Vec<String> = state.keywords.iter().take(self.config.keyword_k).cloned().collect();
        info!(keywords = keywords.len(), destination, "discovery fan-out");

        let (web_branch, vector_branch) = tokio::join!(
            self.web_branch(&keywords, persona, destination),
            self.vector_branch(&keywords, persona, destination),
        );

        state.web_results = web_branch.results;
        state.reranked_web = web_branch.reranked;
        merge_poi_data_map(&mut state.poi_data_map, web_branch.poi_data);

        state.vector_results = vector_branch.results;
        state.reranked_vector = vector_branch.reranked;
        merge_poi_data_map(&mut state.poi_data_map, vector_branch.poi_data);

        let merged = self.merger.merge(&state.reranked_web, &state.reranked_vector);
        state.merged = merged.into_iter().take(self.config.final_poi_count).collect();

        state.final_poi_data = state
            .merged
            .iter()
            .filter_map(|candidate| {
                let id = candidate.poi_id.as_ref()?;
                match state.poi_data_map.get(id) {
                    Some(record) => Some(record.clone()),
                    None => {
                        warn!(poi_id = %id, title = %candidate.title, "no record for merged candidate");
                        None
                    }
                }
            })
            .collect();

        info!(
            web = state.reranked_web.len(),
            vector = state.reranked_vector.len(),
            merged = state.merged.len(),
            final_count = state.final_poi_data.len(),
            "discovery done"
        );
        state
    }

    /// Web branch: multi-query search, bounded per-hit summarize + validate
    /// + persist, rerank
    async fn web_branch(&self, keywords: &[String], persona: &str, destination: &str) -> BranchOutput {
        let hits = self.web.search_multi(keywords, self.config.per_query_results).await;
        let results: Vec<PoiCandidate> = hits.into_iter().take(self.config.web_search_k).collect();
        if results.is_empty() {
            return BranchOutput::default();
        }

        let (processed, poi_data) = self.process_web_results(&results, persona, destination).await;
        let reranked = self.reranker.rerank(&processed, persona).await;

        BranchOutput {
            results,
            reranked,
            poi_data,
        }
    }

    /// Summarize, validate, and persist each hit concurrently (bounded).
    /// A hit is dropped on any per-hit failure.
    async fn process_web_results(
        &self,
        results: &[PoiCandidate],
        persona: &str,
        destination: &str,
    ) -> (Vec<PoiCandidate>, HashMap<String, PoiRecord>) {
        let semaphore = Arc::new(Semaphore::new(PROCESS_CONCURRENCY));

        let futures = results.iter().map(|candidate| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;

                let summary = self.summarizer.summarize_single(candidate, persona).await?;

                let record = match self
                    .mapper
                    .map_summary(&summary, destination, candidate.url.as_deref(), true)
                    .await
                {
                    Ok(Some(record)) => record,
                    Ok(None) => return None,
                    Err(e) => {
                        warn!(title = %candidate.title, error = %e, "validation failed, skipping hit");
                        return None;
                    }
                };

                // Idempotent by poi_id; a write failure costs recall, not
                // correctness
                if let Err(e) = self.index.add(&record).await {
                    warn!(poi_id = %record.id, error = %e, "vector index write failed");
                }

                let mut validated = candidate.clone();
                validated.poi_id = Some(record.id.clone());
                Some((validated, record))
            }
        });

        let mut processed = Vec::new();
        let mut poi_data = HashMap::new();
        for (candidate, record) in join_all(futures).await.into_iter().flatten() {
            poi_data.insert(record.id.clone(), record);
            processed.push(candidate);
        }

        info!(processed = processed.len(), of = results.len(), "web hits validated");
        (processed, poi_data)
    }

    /// Vector branch: per-keyword similarity search with city filter,
    /// dedup by poi_id, rerank. Index failures degrade to empty.
    async fn vector_branch(&self, keywords: &[String], persona: &str, destination: &str) -> BranchOutput {
        let mut seen: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        let mut poi_data = HashMap::new();

        for keyword in keywords {
            let pairs = match self
                .index
                .search_by_text(keyword, self.config.embedding_k, Some(destination))
                .await
            {
                Ok(pairs) => pairs,
                Err(e) => {
                    warn!(keyword = %keyword, error = %e, "vector search degraded to empty");
                    continue;
                }
            };

            for (candidate, record) in pairs {
                let Some(id) = candidate.poi_id.clone() else {
                    continue;
                };
                if seen.insert(id.clone()) {
                    poi_data.insert(id, record);
                    results.push(candidate);
                }
            }
        }

        let reranked = self.reranker.rerank(&results, persona).await;
        BranchOutput {
            results,
            reranked,
            poi_data,
        }
    }
}
