//! Day-balance analysis
//!
//! Flags days carrying too many POIs, and lean days while other days run
//! over the optimum, prescribing concrete movement or removal. No LLM
//! involved.

use tracing::debug;

use crate::config::PlannerConfig;
use crate::domain::DayItinerary;

/// Per-day POI balance analyzer
pub struct ScheduleBalancer {
    optimal_poi_count: usize,
    max_poi_count: usize,
    min_poi_count: usize,
}

impl ScheduleBalancer {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            optimal_poi_count: config.optimal_poi_count,
            max_poi_count: config.max_poi_count,
            min_poi_count: config.min_poi_count,
        }
    }

    /// Analyze per-day POI counts. Returns movement/removal feedback when
    /// the plan is unbalanced, None when it is acceptable.
    pub fn analyze(&self, itineraries: &[DayItinerary]) -> Option<String> {
        if itineraries.is_empty() {
            return None;
        }

        let mut feedbacks = Vec::new();

        let overloaded: Vec<&DayItinerary> = itineraries
            .iter()
            .filter(|day| day.pois.len() > self.max_poi_count)
            .collect();
        if !overloaded.is_empty() {
            feedbacks.push(self.suggest_redistribution(&overloaded, itineraries));
        }

        let lean: Vec<&DayItinerary> = itineraries
            .iter()
            .filter(|day| day.pois.len() < self.min_poi_count)
            .collect();
        if !lean.is_empty() {
            let has_empty_day = lean.iter().any(|day| day.pois.is_empty());
            let has_heavy_day = itineraries.iter().any(|day| day.pois.len() > self.optimal_poi_count);
            if has_empty_day || has_heavy_day {
                feedbacks.push(self.suggest_filling(&lean));
            }
        }

        debug!(failures = feedbacks.len(), "balance analysis done");
        if feedbacks.is_empty() { None } else { Some(feedbacks.join("\n")) }
    }

    fn suggest_redistribution(&self, overloaded: &[&DayItinerary], all: &[DayItinerary]) -> String {
        let mut suggestions = Vec::new();

        for day in overloaded {
            let excess = day.pois.len() - self.optimal_poi_count;
            let movable: Vec<&str> = day.pois[day.pois.len() - excess..]
                .iter()
                .take(3)
                .map(|poi| poi.name.as_str())
                .collect();

            let available: Vec<String> = all
                .iter()
                .filter(|other| other.date != day.date && other.pois.len() < self.optimal_poi_count)
                .map(|other| other.date.to_string())
                .collect();

            let suggestion = match available.first() {
                Some(target) => format!(
                    "{}: {} POIs is too many. Move '{}' and similar to {}.",
                    day.date,
                    day.pois.len(),
                    movable.join("', '"),
                    target
                ),
                None => format!(
                    "{}: {} POIs is too many. Remove '{}' or move them to another day.",
                    day.date,
                    day.pois.len(),
                    movable.join("', '")
                ),
            };
            suggestions.push(suggestion);
        }

        format!("[overloaded days] {}", suggestions.join(" "))
    }

    fn suggest_filling(&self, lean: &[&DayItinerary]) -> String {
        let dates: Vec<String> = lean.iter().map(|day| day.date.to_string()).collect();
        format!(
            "[lean days] {} have too few POIs. Move POIs over from fuller days or add new ones.",
            dates.join(", ")
        )
    }
}
