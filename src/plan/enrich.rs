//! POI top-up via the discovery pipeline
//!
//! When the planner receives fewer POIs than the sufficiency floor, another
//! discovery run tops the set up to the shortfall, deduplicating by id.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::PoiRecord;
use crate::poi::PoiPipeline;

/// Discovery-backed POI enricher
pub struct PoiEnricher {
    pipeline: Arc<PoiPipeline>,
    min_poi_count: usize,
}

impl PoiEnricher {
    pub fn new(pipeline: Arc<PoiPipeline>, min_poi_count: usize) -> Self {
        Self {
            pipeline,
            min_poi_count,
        }
    }

    /// Whether the POI set meets the floor. A floor of zero disables the
    /// gate entirely.
    pub fn is_sufficient(&self, pois: &[PoiRecord]) -> bool {
        pois.len() >= self.min_poi_count
    }

    /// Top up the POI set toward the floor. Keeps the current set intact,
    /// appends only new ids, and never exceeds the shortfall. Discovery
    /// failures degrade to returning the current set.
    pub async fn enrich(&self, current: &[PoiRecord], persona: &str, destination: &str) -> Vec<PoiRecord> {
        if self.is_sufficient(current) {
            return current.to_vec();
        }

        let shortfall = self.min_poi_count - current.len();
        info!(current = current.len(), shortfall, "enriching POI set");

        let discovered = match self.pipeline.run(persona, destination).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "enrichment discovery failed, keeping current POIs");
                return current.to_vec();
            }
        };

        let existing_ids: std::collections::HashSet<&str> = current.iter().map(|p| p.id.as_str()).collect();
        let fresh: Vec<PoiRecord> = discovered
            .into_iter()
            .filter(|record| !existing_ids.contains(record.id.as_str()))
            .take(shortfall)
            .collect();

        info!(added = fresh.len(), "enrichment done");
        current.iter().cloned().chain(fresh).collect()
    }
}
