//! Static constraint validation
//!
//! Checks budget, daily time, and date range against the current attempt,
//! and phrases failures as concrete revision instructions for the next plan
//! call. Passing returns nothing.

use chrono::NaiveDate;
use tracing::debug;

use crate::config::PlannerConfig;
use crate::domain::DayItinerary;

/// Budget/time/date validator
pub struct ConstraintValidator {
    config: PlannerConfig,
}

impl ConstraintValidator {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Validate one attempt. Returns revision feedback on any failure,
    /// None when all constraints hold.
    pub fn validate(
        &self,
        itineraries: &[DayItinerary],
        total_budget: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Option<String> {
        let mut feedbacks = Vec::new();

        if let Some(feedback) = self.validate_budget(itineraries, total_budget) {
            feedbacks.push(feedback);
        }
        if let Some(feedback) = self.validate_daily_time(itineraries) {
            feedbacks.push(feedback);
        }
        if let Some(feedback) = validate_date_range(itineraries, start_date, end_date) {
            feedbacks.push(feedback);
        }

        debug!(failures = feedbacks.len(), "constraint validation done");
        if feedbacks.is_empty() { None } else { Some(feedbacks.join("\n")) }
    }

    /// Estimated spend from the per-category cost table
    pub fn estimated_cost(&self, itineraries: &[DayItinerary]) -> i64 {
        itineraries
            .iter()
            .flat_map(|day| day.pois.iter())
            .map(|poi| self.config.cost_for(poi.category))
            .sum()
    }

    fn validate_budget(&self, itineraries: &[DayItinerary], total_budget: i64) -> Option<String> {
        let estimated = self.estimated_cost(itineraries);
        if estimated <= total_budget {
            return None;
        }

        let poi_count: i64 = itineraries.iter().map(|day| day.pois.len() as i64).sum();
        let average = if poi_count > 0 { (estimated / poi_count).max(1) } else { 1 };
        let reduction = (estimated - total_budget) / average + 1;

        Some(format!(
            "[budget exceeded] Estimated cost {} is over the budget of {}. \
             Drop about {} POIs or swap them for cheaper places.",
            estimated, total_budget, reduction
        ))
    }

    fn validate_daily_time(&self, itineraries: &[DayItinerary]) -> Option<String> {
        let over_days: Vec<String> = itineraries
            .iter()
            .filter(|day| day.total_duration_minutes > self.config.max_daily_minutes)
            .map(|day| {
                format!(
                    "{}: {} hours (at most {} hours recommended)",
                    day.date,
                    day.total_duration_minutes / 60,
                    self.config.max_daily_minutes / 60
                )
            })
            .collect();

        if over_days.is_empty() {
            return None;
        }
        Some(format!(
            "[daily time exceeded] These days run too long: {}. \
             Move some POIs to another day or remove them.",
            over_days.join(", ")
        ))
    }
}

fn validate_date_range(itineraries: &[DayItinerary], start_date: NaiveDate, end_date: NaiveDate) -> Option<String> {
    if itineraries.is_empty() {
        return Some("[no days] No day plans were produced.".to_string());
    }

    let min_date = itineraries.iter().map(|day| day.date).min()?;
    let max_date = itineraries.iter().map(|day| day.date).max()?;

    let mut problems = Vec::new();
    if min_date < start_date {
        problems.push(format!("the plan starts {} before the trip starts {}", min_date, start_date));
    }
    if max_date > end_date {
        problems.push(format!("the plan ends {} after the trip ends {}", max_date, end_date));
    }

    if problems.is_empty() {
        None
    } else {
        Some(format!("[date range] {}.", problems.join("; ")))
    }
}
