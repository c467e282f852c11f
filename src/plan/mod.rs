//! Itinerary planner
//!
//! Bounded fixed-point refinement: plan → task queue (legs, validate,
//! balance) → feedback → replan, at most `max_iterations` plan calls. Every
//! attempt is scored; when the budget runs out the best-scoring attempt is
//! returned as a fallback instead of an error. The whole run races a
//! request-scoped cancellation token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod agent;
mod balance;
mod enrich;
mod state;
mod todo;
mod validate;

pub use agent::{PlanAgent, plan_schema};
pub use balance::ScheduleBalancer;
pub use enrich::PoiEnricher;
pub use state::{PlanState, compute_penalty};
pub use todo::TodoAgent;
pub use validate::ConstraintValidator;

use chrono::NaiveDate;

use crate::config::PlannerConfig;
use crate::domain::{DayItinerary, PlanTask, PoiRecord, TravelMode};
use crate::error::EngineError;
use crate::llm::LlmClient;
use crate::search::TravelLegCalculator;

/// One planning request
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub pois: Vec<PoiRecord>,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_budget: i64,
    pub persona: String,
}

/// Planner output
#[derive(Debug, Clone)]
pub struct PlanResult {
    pub itineraries: Vec<DayItinerary>,
    /// True when the iteration budget ran out and this is the best attempt
    /// seen, which may still violate constraints
    pub fallback: bool,
    pub iterations: u32,
    pub penalty: u64,
}

/// Iterative itinerary planner
pub struct Planner {
    agent: PlanAgent,
    todo: TodoAgent,
    validator: ConstraintValidator,
    balancer: ScheduleBalancer,
    legs: Arc<TravelLegCalculator>,
    enricher: Option<PoiEnricher>,
    config: PlannerConfig,
    cancel: CancellationToken,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, legs: Arc<TravelLegCalculator>, config: PlannerConfig) -> Self {
        Self {
            agent: PlanAgent::new(llm),
            todo: TodoAgent::new(),
            validator: ConstraintValidator::new(config.clone()),
            balancer: ScheduleBalancer::new(&config),
            legs,
            enricher: None,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a discovery-backed enricher for the sufficiency gate
    pub fn with_enricher(mut self, enricher: PoiEnricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Attach a request-scoped cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Plan the trip. Fails only on cancellation or when the LLM stays
    /// unavailable through its retry budget.
    pub async fn run(&self, request: PlanRequest) -> Result<PlanResult, EngineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            result = self.run_inner(request) => result,
        }
    }

    async fn run_inner(&self, request: PlanRequest) -> Result<PlanResult, EngineError> {
        let mut state = PlanState::new(
            request.pois,
            request.destination,
            request.start_date,
            request.end_date,
            request.total_budget,
            request.persona,
        );

        info!(
            pois = state.pois.len(),
            destination = %state.destination,
            start = %state.start_date,
            end = %state.end_date,
            budget = state.total_budget,
            "planning started"
        );

        self.ensure_sufficient_pois(&mut state).await;

        // Nothing to place: zero candidates means zero days, not an error
        if state.pois.is_empty() {
            info!("no POIs available, returning empty plan");
            return Ok(PlanResult {
                itineraries: Vec::new(),
                fallback: false,
                iterations: 0,
                penalty: 0,
            });
        }

        while state.iteration_count < self.config.max_iterations {
            state.iteration_count += 1;
            info!(
                iteration = state.iteration_count,
                max = self.config.max_iterations,
                has_feedback = state.has_feedback(),
                "plan iteration"
            );

            self.plan_step(&mut state).await?;

            state.task_queue = self.todo.plan_tasks(&state);
            let mut replan = false;
            while let Some(task) = state.task_queue.pop_front() {
                state.current_task = Some(task);
                debug!(task = task.as_str(), remaining = state.task_queue.len(), "executing task");

                match task {
                    PlanTask::Plan => {
                        // The attempt produced no placeable days; go around
                        state.validation_feedback =
                            Some("No day plans were produced. Generate a full day-by-day itinerary.".to_string());
                        replan = true;
                    }
                    PlanTask::Legs => self.legs_task(&mut state).await,
                    PlanTask::Validate => {
                        state.validation_feedback = self.validator.validate(
                            &state.itineraries,
                            state.total_budget,
                            state.start_date,
                            state.end_date,
                        );
                    }
                    PlanTask::Balance => {
                        state.schedule_feedback = self.balancer.analyze(&state.itineraries);
                    }
                }
                if replan {
                    break;
                }
            }
            state.current_task = None;

            // Best-so-far tracking for the fallback branch; an attempt with
            // no days is never "best"
            let penalty = compute_penalty(&state.itineraries, state.total_budget, &self.config);
            if !state.itineraries.is_empty() && (state.best_itineraries.is_none() || penalty < state.best_penalty) {
                state.best_penalty = penalty;
                state.best_itineraries = Some(state.itineraries.clone());
            }
            debug!(penalty, best = state.best_penalty, "attempt scored");

            if !state.has_feedback() {
                info!(iterations = state.iteration_count, "plan accepted");
                return Ok(PlanResult {
                    itineraries: state.itineraries,
                    fallback: false,
                    iterations: state.iteration_count,
                    penalty,
                });
            }
        }

        // Iteration budget exhausted: return the best attempt seen
        warn!(
            iterations = state.iteration_count,
            best_penalty = state.best_penalty,
            "iteration budget exhausted, returning best attempt"
        );
        Ok(PlanResult {
            itineraries: state.best_itineraries.unwrap_or(state.itineraries),
            fallback: true,
            iterations: state.iteration_count,
            penalty: state.best_penalty,
        })
    }

    /// Pre-loop gate: top the POI set up to the floor, bounded by
    /// `max_enrich_attempts`; on exhaustion planning proceeds with what is
    /// available
    async fn ensure_sufficient_pois(&self, state: &mut PlanState) {
        let Some(enricher) = &self.enricher else {
            return;
        };

        while !enricher.is_sufficient(&state.pois) && state.poi_enrich_attempts < self.config.max_enrich_attempts {
            state.poi_enrich_attempts += 1;
            info!(
                attempt = state.poi_enrich_attempts,
                max = self.config.max_enrich_attempts,
                pois = state.pois.len(),
                "POI set below floor, enriching"
            );
            state.pois = enricher.enrich(&state.pois, &state.persona, &state.destination).await;
        }

        state.is_poi_sufficient = enricher.is_sufficient(&state.pois);
        if !state.is_poi_sufficient {
            warn!(pois = state.pois.len(), "enrichment exhausted, planning with what is available");
        }
    }

    /// Generate or refine the day plans, then run change detection
    async fn plan_step(&self, state: &mut PlanState) -> Result<(), EngineError> {
        let current_ids = state.placed_poi_ids();
        let feedback = state.joined_feedback();

        let itineraries = match &feedback {
            None => {
                self.agent
                    .generate(
                        &state.pois,
                        &state.destination,
                        state.start_date,
                        state.end_date,
                        &state.persona,
                        None,
                    )
                    .await
            }
            Some(feedback) => {
                self.agent
                    .refine(
                        &state.pois,
                        &state.destination,
                        state.start_date,
                        state.end_date,
                        &state.persona,
                        feedback,
                    )
                    .await
            }
        }
        .map_err(EngineError::CoreUnavailable)?;

        state.itineraries = itineraries;
        let new_ids = state.placed_poi_ids();
        state.is_poi_changed = TodoAgent::check_poi_changed(&new_ids, &current_ids);
        state.previous_poi_ids = current_ids;

        // Fresh attempt, stale feedback gone
        state.validation_feedback = None;
        state.schedule_feedback = None;
        Ok(())
    }

    /// Fill transfers for every day and recompute daily totals. Visit time
    /// comes from the plan's stay durations when aligned, the per-category
    /// table otherwise.
    async fn legs_task(&self, state: &mut PlanState) {
        for day in &mut state.itineraries {
            if day.pois.is_empty() {
                day.transfers.clear();
                day.total_duration_minutes = 0;
                continue;
            }

            day.transfers = self.legs.calc_sequence(&day.pois, TravelMode::Driving).await;

            let transfer_minutes: u32 = day.transfers.iter().map(|t| t.duration_minutes).sum();
            let visit_minutes: u32 = if day.schedule.len() == day.pois.len() {
                day.schedule.iter().map(|visit| visit.duration_minutes).sum()
            } else {
                day.pois
                    .iter()
                    .map(|poi| self.config.visit_minutes_for(poi.category))
                    .sum()
            };
            day.total_duration_minutes = transfer_minutes + visit_minutes;
        }

        let total: u32 = state.itineraries.iter().map(|d| d.total_duration_minutes).sum();
        debug!(days = state.itineraries.len(), total_minutes = total, "legs computed");
    }
}
