//! Configuration types and loading
//!
//! One explicit config record passed at orchestrator construction; there is
//! no process-wide settings singleton. API keys are named by environment
//! variable and resolved at client construction, never stored in files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::PoiCategory;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// POI discovery fan-out and merge weights
    pub search: SearchConfig,

    /// Vector index and embedding endpoint
    pub index: IndexConfig,

    /// Itinerary planner bounds and tables
    pub planner: PlannerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .wayfarer.yml
        let local_config = PathBuf::from(".wayfarer.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/wayfarer/wayfarer.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("wayfarer").join("wayfarer.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Resolve an API key from the named environment variable. Blank values
/// count as unset.
pub(crate) fn env_api_key(env_name: &str) -> Option<String> {
    std::env::var(env_name).ok().filter(|v| !v.trim().is_empty())
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" or "vllm"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; absent for models that reject it
    pub temperature: Option<f64>,

    /// Nucleus sampling cutoff
    #[serde(rename = "top-p")]
    pub top_p: f64,

    /// Per-attempt IO timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Retry budget per call
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        env_api_key(&self.api_key_env)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-5-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 4096,
            temperature: Some(0.7),
            top_p: 0.9,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

/// POI discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Environment variable containing the web search API key
    #[serde(rename = "web-search-api-key-env")]
    pub web_search_api_key_env: String,

    /// Web search API base URL
    #[serde(rename = "web-search-base-url")]
    pub web_search_base_url: String,

    /// Environment variable containing the places/directions API key
    #[serde(rename = "places-api-key-env")]
    pub places_api_key_env: String,

    /// How many extracted keywords to fan out
    #[serde(rename = "keyword-k")]
    pub keyword_k: usize,

    /// Web candidates kept after the multi-query search
    #[serde(rename = "web-search-k")]
    pub web_search_k: usize,

    /// Hits requested per web query
    #[serde(rename = "per-query-results")]
    pub per_query_results: usize,

    /// Vector hits requested per keyword
    #[serde(rename = "embedding-k")]
    pub embedding_k: usize,

    /// Candidates kept after reranking each branch
    #[serde(rename = "rerank-top-n")]
    pub rerank_top_n: usize,

    /// Cap on the merged POI list
    #[serde(rename = "final-poi-count")]
    pub final_poi_count: usize,

    /// Web branch weight in the merge
    #[serde(rename = "web-weight")]
    pub web_weight: f64,

    /// Vector branch weight in the merge
    #[serde(rename = "embedding-weight")]
    pub embedding_weight: f64,
}

impl SearchConfig {
    pub fn web_search_api_key(&self) -> Option<String> {
        env_api_key(&self.web_search_api_key_env)
    }

    pub fn places_api_key(&self) -> Option<String> {
        env_api_key(&self.places_api_key_env)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            web_search_api_key_env: "TAVILY_API_KEY".to_string(),
            web_search_base_url: "https://api.tavily.com".to_string(),
            places_api_key_env: "GOOGLE_MAPS_API_KEY".to_string(),
            keyword_k: 5,
            web_search_k: 10,
            per_query_results: 5,
            embedding_k: 5,
            rerank_top_n: 10,
            final_poi_count: 15,
            web_weight: 0.6,
            embedding_weight: 0.4,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// On-disk collection path; in-memory when unset
    #[serde(rename = "vector-db-path")]
    pub vector_db_path: Option<PathBuf>,

    /// Embeddings endpoint base URL; the hashing fallback is used when unset
    #[serde(rename = "embedding-base-url")]
    pub embedding_base_url: Option<String>,

    /// Embedding model identifier
    #[serde(rename = "embedding-model")]
    pub embedding_model: String,

    /// Environment variable containing the embeddings API key
    #[serde(rename = "embedding-api-key-env")]
    pub embedding_api_key_env: String,

    /// Dimensionality of the hashing fallback embedder
    #[serde(rename = "embedding-dim")]
    pub embedding_dim: usize,
}

impl IndexConfig {
    pub fn embedding_api_key(&self) -> Option<String> {
        env_api_key(&self.embedding_api_key_env)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vector_db_path: None,
            embedding_base_url: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_api_key_env: "OPENAI_API_KEY".to_string(),
            embedding_dim: 256,
        }
    }
}

/// Itinerary planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Refinement loop bound
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Daily activity ceiling in minutes
    #[serde(rename = "max-daily-minutes")]
    pub max_daily_minutes: u32,

    /// Balance target per day
    #[serde(rename = "optimal-poi-count")]
    pub optimal_poi_count: usize,

    /// Balance ceiling per day
    #[serde(rename = "max-poi-count")]
    pub max_poi_count: usize,

    /// Balance floor per day
    #[serde(rename = "min-poi-count")]
    pub min_poi_count: usize,

    /// Minimum POIs required before planning starts; 0 disables the
    /// enrichment gate
    #[serde(rename = "required-poi-count")]
    pub required_poi_count: usize,

    /// Enrichment attempts before planning proceeds regardless
    #[serde(rename = "max-enrich-attempts")]
    pub max_enrich_attempts: u32,

    /// Estimated visit time per category, minutes
    #[serde(rename = "visit-minutes")]
    pub visit_minutes: HashMap<PoiCategory, u32>,

    /// Estimated cost per visit per category, in the trip currency
    #[serde(rename = "cost-per-visit")]
    pub cost_per_visit: HashMap<PoiCategory, i64>,

    /// Persist travel-leg lookups here; in-memory only when unset
    #[serde(rename = "transfer-cache-path")]
    pub transfer_cache_path: Option<PathBuf>,
}

impl PlannerConfig {
    const DEFAULT_VISIT_MINUTES: u32 = 60;
    const DEFAULT_COST_PER_VISIT: i64 = 20_000;

    /// Estimated visit duration for a category
    pub fn visit_minutes_for(&self, category: PoiCategory) -> u32 {
        self.visit_minutes.get(&category).copied().unwrap_or(Self::DEFAULT_VISIT_MINUTES)
    }

    /// Estimated spend for a category
    pub fn cost_for(&self, category: PoiCategory) -> i64 {
        self.cost_per_visit
            .get(&category)
            .copied()
            .unwrap_or(Self::DEFAULT_COST_PER_VISIT)
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let visit_minutes = HashMap::from([
            (PoiCategory::Restaurant, 60),
            (PoiCategory::Cafe, 45),
            (PoiCategory::Attraction, 90),
            (PoiCategory::Accommodation, 30),
            (PoiCategory::Shopping, 60),
            (PoiCategory::Entertainment, 90),
            (PoiCategory::Other, 60),
        ]);
        let cost_per_visit = HashMap::from([
            (PoiCategory::Restaurant, 30_000),
            (PoiCategory::Cafe, 10_000),
            (PoiCategory::Attraction, 20_000),
            (PoiCategory::Accommodation, 0),
            (PoiCategory::Shopping, 40_000),
            (PoiCategory::Entertainment, 30_000),
            (PoiCategory::Other, 20_000),
        ]);

        Self {
            max_iterations: 5,
            max_daily_minutes: 720,
            optimal_poi_count: 4,
            max_poi_count: 6,
            min_poi_count: 2,
            required_poi_count: 5,
            max_enrich_attempts: 2,
            visit_minutes,
            cost_per_visit,
            transfer_cache_path: None,
        }
    }
}
