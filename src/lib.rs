//! Wayfarer - persona-driven travel-plan generation engine
//!
//! Given a traveler persona and a destination, Wayfarer discovers candidate
//! POIs and assembles them into a day-by-day itinerary under budget, time,
//! and balance constraints. Two orchestrators do the work:
//!
//! - **POI discovery** ([`poi::PoiPipeline`]): keyword extraction fans out
//!   into parallel web search and vector retrieval; every web hit is
//!   summarized, validated against the places API, persisted to the vector
//!   index, reranked, and merged.
//! - **Itinerary planning** ([`plan::Planner`]): a bounded refinement loop
//!   (plan → travel legs → validate → balance → replan) with FIFO task-queue
//!   dispatch and a best-attempt fallback when the iteration budget runs
//!   out.
//!
//! External IO (LLM, places, directions, web search, vector store) is
//! consumed through narrow async traits, retried with backoff, and degraded
//! locally: the orchestrators never fail as a whole unless the LLM is
//! unavailable during planning, or the request is cancelled.
//!
//! # Modules
//!
//! - [`llm`] - LLM client trait and the two provider variants
//! - [`domain`] - POI and itinerary data model
//! - [`index`] - cosine vector index with idempotent inserts
//! - [`search`] - web search, places validation, travel legs
//! - [`poi`] - POI discovery pipeline and state
//! - [`plan`] - itinerary planner, task queue, validators
//! - [`config`] - configuration types and loading

use std::sync::Arc;

pub mod config;
pub mod domain;
pub mod error;
pub mod index;
pub mod llm;
pub mod plan;
pub mod poi;
pub mod search;

/// Wire a discovery pipeline from configuration
pub fn build_pipeline(config: &Config) -> Result<poi::PoiPipeline, llm::LlmError> {
    let llm = llm::create_client(&config.llm)?;
    let web = Arc::new(search::TavilySearch::from_config(&config.search));
    let mapper = Arc::new(search::GooglePlacesMapper::from_config(&config.search));
    let index = Arc::new(index::VectorIndex::from_config(&config.index));
    Ok(poi::PoiPipeline::new(llm, web, mapper, index, config.search.clone()))
}

/// Wire a planner, with discovery-backed enrichment, from configuration
pub fn build_planner(config: &Config) -> Result<plan::Planner, llm::LlmError> {
    let llm = llm::create_client(&config.llm)?;
    let api = Arc::new(search::GoogleDirectionsApi::new(config.search.places_api_key()));
    let legs = Arc::new(search::TravelLegCalculator::with_persistence(api, &config.planner));
    let pipeline = Arc::new(build_pipeline(config)?);
    let enricher = plan::PoiEnricher::new(pipeline, config.planner.required_poi_count);
    Ok(plan::Planner::new(llm, legs, config.planner.clone()).with_enricher(enricher))
}

// Re-export commonly used types
pub use config::{Config, IndexConfig, LlmConfig, PlannerConfig, SearchConfig};
pub use domain::{DayItinerary, PoiCandidate, PoiRecord, PoiSummary, Transfer, TravelMode};
pub use error::EngineError;
pub use index::VectorIndex;
pub use llm::{LlmClient, LlmError, create_client};
pub use plan::{PlanRequest, PlanResult, Planner, PoiEnricher};
pub use poi::PoiPipeline;
pub use search::{GoogleDirectionsApi, GooglePlacesMapper, TavilySearch, TravelLegCalculator};
