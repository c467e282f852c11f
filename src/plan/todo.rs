//! Rule-based task planning
//!
//! Decides which tasks the current state needs, with no LLM involved. The
//! queue is strictly FIFO and tasks never run in parallel.

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::debug;

use super::state::PlanState;
use crate::domain::PlanTask;

/// Rule-based task-queue builder
#[derive(Debug, Default)]
pub struct TodoAgent;

impl TodoAgent {
    pub fn new() -> Self {
        Self
    }

    /// Build the task queue for the state after a plan call:
    /// - no itineraries yet → plan again
    /// - legs missing or POI set changed → legs, then validate and balance
    /// - otherwise → validate and balance only
    pub fn plan_tasks(&self, state: &PlanState) -> VecDeque<PlanTask> {
        let mut queue = VecDeque::new();

        if state.itineraries.is_empty() {
            queue.push_back(PlanTask::Plan);
            debug!(?queue, "task queue planned");
            return queue;
        }

        let legs_missing = state
            .itineraries
            .iter()
            .any(|day| day.pois.len() > 1 && day.transfers.is_empty());
        if legs_missing || state.is_poi_changed {
            queue.push_back(PlanTask::Legs);
        }

        queue.push_back(PlanTask::Validate);
        queue.push_back(PlanTask::Balance);

        debug!(?queue, "task queue planned");
        queue
    }

    /// Digest of the sorted POI id set, for change detection
    pub fn poi_digest(ids: &[String]) -> u64 {
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut hasher = DefaultHasher::new();
        for id in sorted {
            id.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Whether the placed POI set differs from the previous iteration's
    pub fn check_poi_changed(current_ids: &[String], previous_ids: &[String]) -> bool {
        Self::poi_digest(current_ids) != Self::poi_digest(previous_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DayItinerary, PoiRecord, Transfer, TravelMode};
    use chrono::NaiveDate;

    fn state() -> PlanState {
        PlanState::new(
            vec![],
            "Seoul",
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 2).unwrap(),
            100_000,
            "persona",
        )
    }

    fn day_with(pois: &[&str], with_transfers: bool) -> DayItinerary {
        let mut day = DayItinerary::new(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        day.pois = pois.iter().map(|id| PoiRecord::bare(*id, *id, *id)).collect();
        if with_transfers {
            day.transfers = day
                .pois
                .windows(2)
                .map(|pair| Transfer::unavailable(&pair[0].id, &pair[1].id, TravelMode::Driving))
                .collect();
        }
        day
    }

    #[test]
    fn test_empty_itineraries_need_plan() {
        let agent = TodoAgent::new();
        let queue = agent.plan_tasks(&state());
        assert_eq!(queue, VecDeque::from([PlanTask::Plan]));
    }

    #[test]
    fn test_missing_legs_schedule_legs_first() {
        let agent = TodoAgent::new();
        let mut s = state();
        s.is_poi_changed = false;
        s.itineraries = vec![day_with(&["a", "b"], false)];

        let queue = agent.plan_tasks(&s);
        assert_eq!(queue, VecDeque::from([PlanTask::Legs, PlanTask::Validate, PlanTask::Balance]));
    }

    #[test]
    fn test_changed_pois_schedule_legs_even_with_transfers() {
        let agent = TodoAgent::new();
        let mut s = state();
        s.is_poi_changed = true;
        s.itineraries = vec![day_with(&["a", "b"], true)];

        let queue = agent.plan_tasks(&s);
        assert_eq!(queue.front(), Some(&PlanTask::Legs));
    }

    #[test]
    fn test_stable_state_validates_only() {
        let agent = TodoAgent::new();
        let mut s = state();
        s.is_poi_changed = false;
        s.itineraries = vec![day_with(&["a", "b"], true)];

        let queue = agent.plan_tasks(&s);
        assert_eq!(queue, VecDeque::from([PlanTask::Validate, PlanTask::Balance]));
    }

    #[test]
    fn test_poi_change_detection_is_order_insensitive() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "x".to_string()];
        assert!(!TodoAgent::check_poi_changed(&a, &b));

        let c = vec!["x".to_string(), "z".to_string()];
        assert!(TodoAgent::check_poi_changed(&a, &c));

        let shorter = vec!["x".to_string()];
        assert!(TodoAgent::check_poi_changed(&a, &shorter));
    }
}
