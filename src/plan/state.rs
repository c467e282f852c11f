//! Typed state for the itinerary refinement loop

use std::collections::VecDeque;

use chrono::NaiveDate;

use crate::config::PlannerConfig;
use crate::domain::{DayItinerary, PlanTask, PoiRecord};

/// Planner state for one request
#[derive(Debug, Clone)]
pub struct PlanState {
    // Inputs
    pub pois: Vec<PoiRecord>,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_budget: i64,
    pub persona: String,

    // Working
    pub itineraries: Vec<DayItinerary>,
    pub validation_feedback: Option<String>,
    pub schedule_feedback: Option<String>,
    pub iteration_count: u32,
    pub previous_poi_ids: Vec<String>,
    pub poi_enrich_attempts: u32,
    pub is_poi_sufficient: bool,
    pub is_poi_changed: bool,

    // Control
    pub task_queue: VecDeque<PlanTask>,
    pub current_task: Option<PlanTask>,

    // Fallback
    pub best_itineraries: Option<Vec<DayItinerary>>,
    pub best_penalty: u64,
}

impl PlanState {
    pub fn new(
        pois: Vec<PoiRecord>,
        destination: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        total_budget: i64,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            pois,
            destination: destination.into(),
            start_date,
            end_date,
            total_budget,
            persona: persona.into(),
            itineraries: Vec::new(),
            validation_feedback: None,
            schedule_feedback: None,
            iteration_count: 0,
            previous_poi_ids: Vec::new(),
            poi_enrich_attempts: 0,
            is_poi_sufficient: true,
            is_poi_changed: true,
            task_queue: VecDeque::new(),
            current_task: None,
            best_itineraries: None,
            best_penalty: u64::MAX,
        }
    }

    pub fn has_feedback(&self) -> bool {
        self.validation_feedback.is_some() || self.schedule_feedback.is_some()
    }

    /// Validation and balance feedback joined for the next refine call
    pub fn joined_feedback(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .validation_feedback
            .as_deref()
            .into_iter()
            .chain(self.schedule_feedback.as_deref())
            .collect();
        if parts.is_empty() { None } else { Some(parts.join("\n")) }
    }

    /// POI ids currently placed in the itineraries, in day order
    pub fn placed_poi_ids(&self) -> Vec<String> {
        self.itineraries
            .iter()
            .flat_map(|day| day.pois.iter().map(|p| p.id.clone()))
            .collect()
    }
}

/// Non-negative badness of an attempt: minute overages across days, budget
/// overage (per thousand currency units), and per-day POI-count overages.
/// Zero means every constraint holds.
pub fn compute_penalty(itineraries: &[DayItinerary], total_budget: i64, config: &PlannerConfig) -> u64 {
    let mut penalty: u64 = 0;

    for day in itineraries {
        let over_minutes = day.total_duration_minutes.saturating_sub(config.max_daily_minutes);
        penalty += over_minutes as u64;

        let over_count = day.pois.len().saturating_sub(config.max_poi_count);
        penalty += (over_count as u64) * 30;
    }

    let estimated_cost: i64 = itineraries
        .iter()
        .flat_map(|day| day.pois.iter())
        .map(|poi| config.cost_for(poi.category))
        .sum();
    if estimated_cost > total_budget {
        penalty += ((estimated_cost - total_budget) / 1_000).max(1) as u64;
    }

    penalty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PoiCategory;

    fn day(date: &str, pois: usize, total_minutes: u32) -> DayItinerary {
        let mut d = DayItinerary::new(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap());
        for i in 0..pois {
            let mut record = PoiRecord::bare(format!("{}-{}", date, i), "p", "p");
            record.category = PoiCategory::Attraction;
            d.pois.push(record);
        }
        d.total_duration_minutes = total_minutes;
        d
    }

    #[test]
    fn test_penalty_zero_when_constraints_hold() {
        let config = PlannerConfig::default();
        let days = vec![day("2026-08-01", 3, 400)];
        // 3 attractions at 20k each, well under budget
        assert_eq!(compute_penalty(&days, 1_000_000, &config), 0);
    }

    #[test]
    fn test_penalty_counts_minute_overage() {
        let config = PlannerConfig::default();
        let days = vec![day("2026-08-01", 3, 750)];
        assert_eq!(compute_penalty(&days, 1_000_000, &config), 30);
    }

    #[test]
    fn test_penalty_counts_budget_and_count_overage() {
        let config = PlannerConfig::default();
        // 8 attractions: 2 over max_poi_count, 160k estimated cost
        let days = vec![day("2026-08-01", 8, 400)];
        let penalty = compute_penalty(&days, 100_000, &config);
        // 2 * 30 count overage + 60 budget overage (60k / 1k)
        assert_eq!(penalty, 120);
    }

    #[test]
    fn test_joined_feedback() {
        let mut state = PlanState::new(
            vec![],
            "Seoul",
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 2).unwrap(),
            100_000,
            "persona",
        );
        assert!(state.joined_feedback().is_none());

        state.validation_feedback = Some("too long".to_string());
        state.schedule_feedback = Some("unbalanced".to_string());
        assert_eq!(state.joined_feedback().unwrap(), "too long\nunbalanced");
        assert!(state.has_feedback());
    }
}
