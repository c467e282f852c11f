//! LLM itinerary generation
//!
//! Assigns POIs to dates with start times and stay durations. Transfers are
//! never produced here; the legs task fills them in afterwards. Output is
//! schema-constrained, and plan entries naming unknown POI ids are dropped
//! with a warning rather than failing the iteration.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{DayItinerary, PoiRecord, ScheduledVisit};
use crate::llm::{LlmClient, LlmError};

const PLAN_SYSTEM_PROMPT: &str = "You are a travel itinerary planner.
Place the given POIs across the travel dates to build the best possible
schedule.

Rules:
1. Put 4-5 POIs on each day, never far more or fewer
2. Keep POIs with nearby addresses on the same day
3. Put restaurants and cafes in meal windows (lunch 11:30-13:00, dinner 17:30-19:00)
4. Include every POI exactly once
5. If feedback is given, it must be addressed
6. Give each POI a start time (HH:MM, 24-hour) and a stay duration in minutes
7. Keep each day between 09:00 and 21:00
8. Leave about 30 minutes between POIs for travel
9. Choose stay durations that fit the place (attractions 60-120, cafes 30-60, restaurants 60-90)";

/// Schema for the structured plan output
pub fn plan_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "day_plans": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "date": { "type": "string", "description": "YYYY-MM-DD" },
                        "scheduled_pois": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "poi_id": { "type": "string" },
                                    "start_time": { "type": "string", "description": "HH:MM, 24-hour" },
                                    "duration_minutes": { "type": "integer" }
                                },
                                "required": ["poi_id", "start_time", "duration_minutes"]
                            }
                        }
                    },
                    "required": ["date", "scheduled_pois"]
                }
            },
            "reasoning": { "type": "string" }
        },
        "required": ["day_plans", "reasoning"]
    })
}

#[derive(Debug, Deserialize)]
struct PlanOutput {
    day_plans: Vec<DayPlanOutput>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct DayPlanOutput {
    date: String,
    scheduled_pois: Vec<ScheduledPoiOutput>,
}

#[derive(Debug, Deserialize)]
struct ScheduledPoiOutput {
    poi_id: String,
    start_time: String,
    duration_minutes: u32,
}

/// LLM plan/refine agent
pub struct PlanAgent {
    llm: Arc<dyn LlmClient>,
}

impl PlanAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Generate day plans for the POIs. Transfers stay empty.
    pub async fn generate(
        &self,
        pois: &[PoiRecord],
        destination: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        persona: &str,
        feedback: Option<&str>,
    ) -> Result<Vec<DayItinerary>, LlmError> {
        info!(
            pois = pois.len(),
            destination,
            %start_date,
            %end_date,
            has_feedback = feedback.is_some(),
            "generating itinerary"
        );

        let prompt = build_prompt(pois, destination, start_date, end_date, persona, feedback);
        let value = self.llm.complete_structured(&prompt, &plan_schema()).await?;

        let output: PlanOutput =
            serde_json::from_value(value).map_err(|e| LlmError::SchemaViolation(e.to_string()))?;
        debug!(days = output.day_plans.len(), reasoning_len = output.reasoning.len(), "plan received");

        Ok(convert_to_itineraries(output, pois))
    }

    /// Refine the current plan against feedback; regenerates with the
    /// feedback attached
    pub async fn refine(
        &self,
        pois: &[PoiRecord],
        destination: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        persona: &str,
        feedback: &str,
    ) -> Result<Vec<DayItinerary>, LlmError> {
        self.generate(pois, destination, start_date, end_date, persona, Some(feedback)).await
    }
}

fn build_prompt(
    pois: &[PoiRecord],
    destination: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    persona: &str,
    feedback: Option<&str>,
) -> String {
    let poi_lines: String = pois
        .iter()
        .map(|poi| {
            let description: String = poi.description.chars().take(50).collect();
            format!(
                "- id: {}, name: {}, category: {}, description: {}, address: {}\n",
                poi.id,
                poi.name,
                poi.category,
                if description.is_empty() { "none" } else { description.as_str() },
                poi.address.as_deref().unwrap_or("none"),
            )
        })
        .collect();

    let mut prompt = format!(
        "{}\n\n<travel_info>\n  <destination>{}</destination>\n  <start_date>{}</start_date>\n  <end_date>{}</end_date>\n</travel_info>\n\n<persona>\n{}\n</persona>\n\n<poi_list>\n{}</poi_list>\n",
        PLAN_SYSTEM_PROMPT, destination, start_date, end_date, persona, poi_lines
    );

    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\n<feedback>\nRevise the plan to address this feedback:\n{}\n</feedback>\n",
            feedback
        ));
    }

    prompt.push_str("\nBuild the best itinerary for these dates. Place the POIs day by day, in visiting order, each with a start time and stay duration.\n");
    prompt
}

/// Resolve plan output against the POI set. Unknown poi_ids and unparseable
/// dates are dropped with a warning.
fn convert_to_itineraries(output: PlanOutput, pois: &[PoiRecord]) -> Vec<DayItinerary> {
    let poi_map: HashMap<&str, &PoiRecord> = pois.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut unmapped: Vec<String> = Vec::new();
    let mut itineraries = Vec::new();

    for day_plan in output.day_plans {
        let Ok(date) = NaiveDate::parse_from_str(&day_plan.date, "%Y-%m-%d") else {
            warn!(date = %day_plan.date, "dropping day with unparseable date");
            continue;
        };

        let mut day = DayItinerary::new(date);
        for scheduled in day_plan.scheduled_pois {
            match poi_map.get(scheduled.poi_id.as_str()) {
                Some(record) => {
                    day.pois.push((*record).clone());
                    day.schedule.push(ScheduledVisit {
                        poi_id: scheduled.poi_id,
                        start_time: scheduled.start_time,
                        duration_minutes: scheduled.duration_minutes,
                    });
                }
                None => unmapped.push(scheduled.poi_id),
            }
        }
        itineraries.push(day);
    }

    if !unmapped.is_empty() {
        warn!(?unmapped, "plan referenced unknown poi ids");
    }
    itineraries
}
