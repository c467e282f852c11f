//! End-to-end tests for the discovery and planning pipelines
//!
//! External IO is replaced with in-process fakes: a rule-based mock LLM, a
//! canned web search, a places mapper that validates from the summary, and
//! fixed directions. The vector index runs in-memory with the hashing
//! embedder.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use wayfarer::config::{PlannerConfig, SearchConfig};
use wayfarer::domain::poi::{PoiCandidate, PoiRecord, PoiSource, PoiSummary, PoiValidationError, poi_id_from_url};
use wayfarer::domain::synthetic_source_url;
use wayfarer::error::EngineError;
use wayfarer::index::{HashingEmbedder, VectorIndex};
use wayfarer::llm::client::mock::MockLlmClient;
use wayfarer::plan::{PlanRequest, Planner, PoiEnricher};
use wayfarer::poi::PoiPipeline;
use wayfarer::search::directions::{DirectionsApi, DirectionsError, TravelLegCalculator};
use wayfarer::search::places::PoiMapper;
use wayfarer::search::web::WebSearch;
use wayfarer::domain::TravelMode;

// =============================================================================
// Fakes
// =============================================================================

struct StaticWeb {
    hits: Vec<PoiCandidate>,
    calls: AtomicUsize,
}

impl StaticWeb {
    fn new(hits: Vec<PoiCandidate>) -> Self {
        Self {
            hits,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WebSearch for StaticWeb {
    async fn search(&self, _query: &str, count: usize) -> Vec<PoiCandidate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hits.iter().take(count).cloned().collect()
    }
}

/// Validates every summary except the configured failures
struct FakeMapper {
    failing_names: HashSet<String>,
}

impl FakeMapper {
    fn passing() -> Self {
        Self {
            failing_names: HashSet::new(),
        }
    }

    fn failing(names: &[&str]) -> Self {
        Self {
            failing_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl PoiMapper for FakeMapper {
    async fn map_summary(
        &self,
        summary: &PoiSummary,
        city: &str,
        source_url: Option<&str>,
        raise_on_failure: bool,
    ) -> Result<Option<PoiRecord>, PoiValidationError> {
        if self.failing_names.contains(&summary.name) {
            if raise_on_failure {
                return Err(PoiValidationError(format!("place not found: {}", summary.name)));
            }
            return Ok(None);
        }

        let canonical_url = source_url
            .map(str::to_string)
            .unwrap_or_else(|| synthetic_source_url(&summary.name, city));

        let mut record = PoiRecord::bare(poi_id_from_url(&canonical_url), &summary.name, summary.embedding_text());
        record.category = summary.category;
        record.city = Some(city.to_string());
        record.address = Some(format!("1 {} Street", summary.name));
        record.source_url = Some(canonical_url);
        record.latitude = Some(37.56);
        record.longitude = Some(126.99);
        Ok(Some(record))
    }
}

struct FixedDirections {
    minutes: u32,
}

#[async_trait]
impl DirectionsApi for FixedDirections {
    async fn route(&self, _: &PoiRecord, _: &PoiRecord, _: TravelMode) -> Result<(u32, f64), DirectionsError> {
        Ok((self.minutes, 2.5))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const PERSONA: &str = "20s solo traveler, Euljiro food tour";
const DESTINATION: &str = "Seoul";

const URL_SNAILS: &str = "https://blog.example/euljiro-snails";
const URL_BAR: &str = "https://blog.example/euljiro-bar";
const URL_CAFE: &str = "https://blog.example/euljiro-cafe";

fn web_hit(title: &str, url: &str, relevance: f64) -> PoiCandidate {
    PoiCandidate::new(title, format!("{} writeup", title), PoiSource::Web)
        .with_url(url)
        .with_relevance(relevance)
}

fn poi_block(name: &str, category: &str) -> String {
    format!(
        "<poi><name>{}</name><category>{}</category>\
         <description>{} in the Euljiro printing district.</description>\
         <address></address><summary>Fits a solo food tour.</summary>\
         <highlights>local, cheap</highlights></poi>",
        name, category, name
    )
}

/// Mock LLM wired for discovery: keyword extraction plus one summarize rule
/// per known hit title
fn discovery_llm() -> MockLlmClient {
    MockLlmClient::new()
        .respond_when(
            "keyword extraction expert",
            "<keywords><keyword>Euljiro snails</keyword><keyword>Euljiro bar</keyword>\
             <keyword>Euljiro cafe</keyword></keywords>",
        )
        .respond_when("Euljiro Snail Alley", poi_block("Euljiro Snail Alley", "restaurant"))
        .respond_when("Euljiro Craft Bar", poi_block("Euljiro Craft Bar", "entertainment"))
        .respond_when("Euljiro Roastery", poi_block("Euljiro Roastery", "cafe"))
}

fn search_config() -> SearchConfig {
    SearchConfig {
        final_poi_count: 3,
        ..Default::default()
    }
}

fn memory_index() -> Arc<VectorIndex> {
    Arc::new(VectorIndex::new(Arc::new(HashingEmbedder::new(128)), None))
}

fn pipeline_with(llm: Arc<MockLlmClient>, hits: Vec<PoiCandidate>, index: Arc<VectorIndex>) -> PoiPipeline {
    PoiPipeline::new(
        llm,
        Arc::new(StaticWeb::new(hits)),
        Arc::new(FakeMapper::passing()),
        index,
        search_config(),
    )
}

fn legs(minutes: u32) -> Arc<TravelLegCalculator> {
    Arc::new(TravelLegCalculator::new(Arc::new(FixedDirections { minutes })))
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn plan_day(date: &str, entries: &[(&str, &str, u32)]) -> serde_json::Value {
    serde_json::json!({
        "date": date,
        "scheduled_pois": entries
            .iter()
            .map(|(id, start, minutes)| serde_json::json!({
                "poi_id": id,
                "start_time": start,
                "duration_minutes": minutes,
            }))
            .collect::<Vec<_>>(),
    })
}

fn plan_value(days: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({ "day_plans": days, "reasoning": "test plan" })
}

fn request(pois: Vec<PoiRecord>, start: &str, end: &str, budget: i64) -> PlanRequest {
    PlanRequest {
        pois,
        destination: DESTINATION.to_string(),
        start_date: date(start),
        end_date: date(end),
        total_budget: budget,
        persona: PERSONA.to_string(),
    }
}

fn restaurant(id: &str, name: &str) -> PoiRecord {
    let mut record = PoiRecord::bare(id, name, name);
    record.category = wayfarer::domain::PoiCategory::Restaurant;
    record.city = Some(DESTINATION.to_string());
    record
}

// =============================================================================
// Discovery pipeline
// =============================================================================

#[tokio::test]
async fn test_discovery_happy_path() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    let hits = vec![
        web_hit("Euljiro Snail Alley", URL_SNAILS, 0.9),
        web_hit("Euljiro Craft Bar", URL_BAR, 0.8),
        web_hit("Euljiro Roastery", URL_CAFE, 0.7),
    ];
    let pipeline = pipeline_with(llm, hits, index.clone());

    let records = pipeline.run(PERSONA, DESTINATION).await.unwrap();

    assert_eq!(records.len(), 3);
    let ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(poi_id_from_url(URL_SNAILS).as_str()));
    assert!(ids.contains(poi_id_from_url(URL_BAR).as_str()));
    assert!(ids.contains(poi_id_from_url(URL_CAFE).as_str()));

    // Every validated record was persisted
    assert_eq!(index.size().await.unwrap(), 3);
}

#[tokio::test]
async fn test_discovery_is_idempotent_across_runs() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    let hits = vec![
        web_hit("Euljiro Snail Alley", URL_SNAILS, 0.9),
        web_hit("Euljiro Craft Bar", URL_BAR, 0.8),
    ];
    let pipeline = pipeline_with(llm, hits, index.clone());

    let first = pipeline.run(PERSONA, DESTINATION).await.unwrap();
    let second = pipeline.run(PERSONA, DESTINATION).await.unwrap();

    // Same URLs, same ids, no duplicate rows
    let first_ids: HashSet<String> = first.iter().map(|r| r.id.clone()).collect();
    let second_ids: HashSet<String> = second.iter().map(|r| r.id.clone()).collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(index.size().await.unwrap(), 2);
}

#[tokio::test]
async fn test_discovery_collapses_duplicate_urls() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    // Two hits share a URL; one distinct
    let hits = vec![
        web_hit("Euljiro Snail Alley", URL_SNAILS, 0.9),
        web_hit("Euljiro Snail Alley", URL_SNAILS, 0.6),
        web_hit("Euljiro Craft Bar", URL_BAR, 0.8),
    ];
    let pipeline = pipeline_with(llm, hits, index.clone());

    let records = pipeline.run(PERSONA, DESTINATION).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(index.size().await.unwrap(), 2);
}

#[tokio::test]
async fn test_discovery_skips_validation_failures() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    let hits = vec![
        web_hit("Euljiro Snail Alley", URL_SNAILS, 0.9),
        web_hit("Euljiro Craft Bar", URL_BAR, 0.8),
        web_hit("Euljiro Roastery", URL_CAFE, 0.7),
    ];
    let pipeline = PoiPipeline::new(
        llm,
        Arc::new(StaticWeb::new(hits)),
        Arc::new(FakeMapper::failing(&["Euljiro Craft Bar"])),
        index.clone(),
        search_config(),
    );

    let records = pipeline.run(PERSONA, DESTINATION).await.unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.name != "Euljiro Craft Bar"));
    assert_eq!(index.size().await.unwrap(), 2);
}

#[tokio::test]
async fn test_discovery_from_vector_branch_only() {
    let llm = Arc::new(MockLlmClient::new().respond_when(
        "keyword extraction expert",
        "<keywords><keyword>Seoul market food</keyword></keywords>",
    ));
    let index = memory_index();

    // Two records already in the index, web search returns nothing
    let mut seeded = vec![
        restaurant(&poi_id_from_url("https://blog.example/mangwon"), "Mangwon Market"),
        restaurant(&poi_id_from_url("https://blog.example/gwangjang"), "Gwangjang Market"),
    ];
    for record in &mut seeded {
        record.raw_text = format!("{}. Street food market in Seoul.", record.name);
    }
    index.add_batch(&seeded).await.unwrap();

    let pipeline = pipeline_with(llm, Vec::new(), index.clone());
    let records = pipeline.run(PERSONA, DESTINATION).await.unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.source == PoiSource::Web));
    let names: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert!(names.contains("Mangwon Market"));
    assert!(names.contains("Gwangjang Market"));
}

#[tokio::test]
async fn test_discovery_empty_persona_returns_nothing() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    let pipeline = pipeline_with(llm, vec![web_hit("Euljiro Snail Alley", URL_SNAILS, 0.9)], index.clone());

    let records = pipeline.run("", DESTINATION).await.unwrap();

    assert!(records.is_empty());
    // Nothing was searched or persisted
    assert_eq!(index.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_discovery_cancellation() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let pipeline = pipeline_with(llm, vec![web_hit("Euljiro Snail Alley", URL_SNAILS, 0.9)], index)
        .with_cancellation(cancel);

    let result = pipeline.run(PERSONA, DESTINATION).await;
    assert!(matches!(result, Err(EngineError::Cancelled)));
}

// =============================================================================
// Itinerary planner
// =============================================================================

#[tokio::test]
async fn test_planner_happy_path_single_day() {
    let llm = Arc::new(MockLlmClient::new());
    let pois = vec![
        restaurant("p1", "Snail Alley"),
        restaurant("p2", "Craft Bar"),
        restaurant("p3", "Roastery"),
    ];
    llm.push_structured(plan_value(vec![plan_day(
        "2026-08-01",
        &[("p1", "11:30", 60), ("p2", "13:00", 90), ("p3", "15:30", 60)],
    )]));

    let planner = Planner::new(llm, legs(20), PlannerConfig::default());
    let result = planner
        .run(request(pois, "2026-08-01", "2026-08-01", 1_000_000))
        .await
        .unwrap();

    assert!(!result.fallback);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.itineraries.len(), 1);

    let day = &result.itineraries[0];
    assert_eq!(day.pois.len(), 3);
    assert_eq!(day.transfers.len(), 2);
    assert!(day.transfers_aligned());
    // Two 20-minute legs plus the planned stays
    assert_eq!(day.total_duration_minutes, 20 + 20 + 60 + 90 + 60);
}

#[tokio::test]
async fn test_planner_replans_on_validation_feedback() {
    let llm = Arc::new(MockLlmClient::new());
    let pois: Vec<PoiRecord> = (0..8).map(|i| restaurant(&format!("p{}", i), &format!("Place {}", i))).collect();

    // First attempt over-packs one day far past the daily ceiling
    let overpacked: Vec<(String, String, u32)> = (0..8).map(|i| (format!("p{}", i), "09:00".to_string(), 120)).collect();
    let overpacked_refs: Vec<(&str, &str, u32)> =
        overpacked.iter().map(|(id, start, d)| (id.as_str(), start.as_str(), *d)).collect();
    llm.push_structured(plan_value(vec![plan_day("2026-08-01", &overpacked_refs)]));

    // Second attempt splits across both days with sane stays
    let day1: Vec<(String, String, u32)> = (0..4).map(|i| (format!("p{}", i), "10:00".to_string(), 60)).collect();
    let day2: Vec<(String, String, u32)> = (4..8).map(|i| (format!("p{}", i), "10:00".to_string(), 60)).collect();
    let day1_refs: Vec<(&str, &str, u32)> = day1.iter().map(|(id, s, d)| (id.as_str(), s.as_str(), *d)).collect();
    let day2_refs: Vec<(&str, &str, u32)> = day2.iter().map(|(id, s, d)| (id.as_str(), s.as_str(), *d)).collect();
    llm.push_structured(plan_value(vec![
        plan_day("2026-08-01", &day1_refs),
        plan_day("2026-08-02", &day2_refs),
    ]));

    let config = PlannerConfig::default();
    let max_daily = config.max_daily_minutes;
    let planner = Planner::new(llm.clone(), legs(20), config);
    let result = planner
        .run(request(pois, "2026-08-01", "2026-08-02", 1_000_000))
        .await
        .unwrap();

    assert!(!result.fallback);
    assert_eq!(result.iterations, 2);
    assert_eq!(llm.structured_calls(), 2);
    assert_eq!(result.itineraries.len(), 2);
    for day in &result.itineraries {
        assert!(day.total_duration_minutes <= max_daily);
        assert!(day.transfers_aligned());
    }
}

#[tokio::test]
async fn test_planner_fallback_returns_best_attempt() {
    let llm = Arc::new(MockLlmClient::new());
    let pois: Vec<PoiRecord> = (0..4).map(|i| restaurant(&format!("p{}", i), &format!("Place {}", i))).collect();

    // Every attempt exceeds the daily ceiling; totals shrink so the last
    // attempt is the best one
    for round in 0..5u32 {
        let stay = 200 - round * 5;
        let entries: Vec<(String, String, u32)> =
            (0..4).map(|i| (format!("p{}", i), "09:00".to_string(), stay)).collect();
        let refs: Vec<(&str, &str, u32)> = entries.iter().map(|(id, s, d)| (id.as_str(), s.as_str(), *d)).collect();
        llm.push_structured(plan_value(vec![plan_day("2026-08-01", &refs)]));
    }

    let config = PlannerConfig::default();
    let max_daily = config.max_daily_minutes;
    let planner = Planner::new(llm.clone(), legs(20), config);
    let result = planner
        .run(request(pois, "2026-08-01", "2026-08-01", 1_000_000))
        .await
        .unwrap();

    // Bounded iteration: exactly max_iterations plan calls, then fallback
    assert!(result.fallback);
    assert_eq!(result.iterations, 5);
    assert_eq!(llm.structured_calls(), 5);

    // The fallback may violate the ceiling, but it is the lowest-penalty
    // attempt: 4 x 180-minute stays + 3 x 20-minute legs
    assert_eq!(result.itineraries.len(), 1);
    assert_eq!(result.itineraries[0].total_duration_minutes, 4 * 180 + 60);
    assert!(result.itineraries[0].total_duration_minutes > max_daily);
    assert_eq!(result.penalty, (4 * 180 + 60 - max_daily) as u64);
}

#[tokio::test]
async fn test_planner_zero_pois_returns_zero_days() {
    let llm = Arc::new(MockLlmClient::new());
    let planner = Planner::new(llm.clone(), legs(20), PlannerConfig::default());

    let result = planner
        .run(request(Vec::new(), "2026-08-01", "2026-08-02", 1_000_000))
        .await
        .unwrap();

    assert!(result.itineraries.is_empty());
    assert!(!result.fallback);
    assert_eq!(llm.structured_calls(), 0);
}

#[tokio::test]
async fn test_planner_surfaces_llm_unavailability() {
    // Empty structured queue: every plan call fails upstream
    let llm = Arc::new(MockLlmClient::new());
    let pois = vec![restaurant("p1", "Snail Alley")];

    let planner = Planner::new(llm, legs(20), PlannerConfig::default());
    let result = planner.run(request(pois, "2026-08-01", "2026-08-01", 1_000_000)).await;

    assert!(matches!(result, Err(EngineError::CoreUnavailable(_))));
}

#[tokio::test]
async fn test_planner_cancellation() {
    let llm = Arc::new(MockLlmClient::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let planner = Planner::new(llm, legs(20), PlannerConfig::default()).with_cancellation(cancel);
    let result = planner
        .run(request(vec![restaurant("p1", "Snail Alley")], "2026-08-01", "2026-08-01", 1_000_000))
        .await;

    assert!(matches!(result, Err(EngineError::Cancelled)));
}

// =============================================================================
// Discovery feeding the planner
// =============================================================================

#[tokio::test]
async fn test_end_to_end_discovery_then_planning() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    let hits = vec![
        web_hit("Euljiro Snail Alley", URL_SNAILS, 0.9),
        web_hit("Euljiro Craft Bar", URL_BAR, 0.8),
        web_hit("Euljiro Roastery", URL_CAFE, 0.7),
    ];
    let pipeline = pipeline_with(llm.clone(), hits, index);

    let records = pipeline.run(PERSONA, DESTINATION).await.unwrap();
    assert_eq!(records.len(), 3);

    let entries: Vec<(String, String, u32)> = records
        .iter()
        .map(|r| (r.id.clone(), "10:00".to_string(), 60))
        .collect();
    let refs: Vec<(&str, &str, u32)> = entries.iter().map(|(id, s, d)| (id.as_str(), s.as_str(), *d)).collect();
    llm.push_structured(plan_value(vec![plan_day("2026-08-01", &refs)]));

    let planner = Planner::new(llm, legs(20), PlannerConfig::default());
    let result = planner
        .run(request(records, "2026-08-01", "2026-08-01", 1_000_000))
        .await
        .unwrap();

    assert!(!result.fallback);
    let day = &result.itineraries[0];
    assert_eq!(day.pois.len(), 3);
    assert_eq!(day.transfers.len(), 2);
    assert_eq!(day.total_duration_minutes, 2 * 20 + 3 * 60);
}

#[tokio::test]
async fn test_zero_floor_disables_enrichment_gate() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    let pipeline = Arc::new(pipeline_with(llm, Vec::new(), index));

    let enricher = PoiEnricher::new(pipeline, 0);
    assert!(enricher.is_sufficient(&[]));

    // Sufficient set comes back untouched, no discovery run
    let current = vec![restaurant("p1", "Snail Alley")];
    let enriched = enricher.enrich(&current, PERSONA, DESTINATION).await;
    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0].id, "p1");
}

#[tokio::test]
async fn test_planner_enrichment_gate_tops_up_pois() {
    let llm = Arc::new(discovery_llm());
    let index = memory_index();
    let hits = vec![
        web_hit("Euljiro Snail Alley", URL_SNAILS, 0.9),
        web_hit("Euljiro Craft Bar", URL_BAR, 0.8),
        web_hit("Euljiro Roastery", URL_CAFE, 0.7),
    ];
    let pipeline = Arc::new(pipeline_with(llm.clone(), hits, index));

    // One seed POI, floor of 5: the gate runs discovery and tops up to 4
    // (3 new), then exhausts its attempts and proceeds
    let seed = restaurant("seed", "Gwangjang Market");
    let enricher = PoiEnricher::new(pipeline, 5);

    let mut expected_ids = vec![
        "seed".to_string(),
        poi_id_from_url(URL_SNAILS),
        poi_id_from_url(URL_BAR),
        poi_id_from_url(URL_CAFE),
    ];
    expected_ids.sort();

    let entries: Vec<(String, String, u32)> = expected_ids
        .iter()
        .map(|id| (id.clone(), "10:00".to_string(), 60))
        .collect();
    let refs: Vec<(&str, &str, u32)> = entries.iter().map(|(id, s, d)| (id.as_str(), s.as_str(), *d)).collect();
    llm.push_structured(plan_value(vec![plan_day("2026-08-01", &refs)]));

    let planner = Planner::new(llm, legs(10), PlannerConfig::default()).with_enricher(enricher);
    let result = planner
        .run(request(vec![seed], "2026-08-01", "2026-08-01", 1_000_000))
        .await
        .unwrap();

    assert_eq!(result.itineraries[0].pois.len(), 4);
    let mut placed: Vec<String> = result.itineraries[0].pois.iter().map(|p| p.id.clone()).collect();
    placed.sort();
    assert_eq!(placed, expected_ids);
}
