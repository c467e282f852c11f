//! Itinerary data model
//!
//! A `DayItinerary` is one day of a trip: an ordered POI list, the transfers
//! between consecutive POIs, and the day's total duration. Transfers are
//! produced by the travel-leg calculator, never by the LLM.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::poi::PoiRecord;

/// Travel mode supported by the directions API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Driving,
    Walking,
    Transit,
    Bicycling,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Transit => "transit",
            TravelMode::Bicycling => "bicycling",
        }
    }
}

/// Directed movement between two consecutive POIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from_poi_id: String,
    pub to_poi_id: String,
    pub mode: TravelMode,
    pub duration_minutes: u32,
    pub distance_km: f64,
}

impl Transfer {
    /// Sentinel transfer returned when the directions API is unavailable.
    /// Zero duration and distance, mode preserved.
    pub fn unavailable(from_poi_id: impl Into<String>, to_poi_id: impl Into<String>, mode: TravelMode) -> Self {
        Self {
            from_poi_id: from_poi_id.into(),
            to_poi_id: to_poi_id.into(),
            mode,
            duration_minutes: 0,
            distance_km: 0.0,
        }
    }
}

/// Time assignment for one POI within a day, as produced by the plan agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledVisit {
    pub poi_id: String,
    /// Start time, HH:MM 24-hour
    pub start_time: String,
    pub duration_minutes: u32,
}

/// One day of the trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayItinerary {
    /// Date, YYYY-MM-DD
    pub date: NaiveDate,
    #[serde(default)]
    pub pois: Vec<PoiRecord>,
    /// Per-POI time assignments, parallel to `pois` when present
    #[serde(default)]
    pub schedule: Vec<ScheduledVisit>,
    /// Always `pois.len() - 1` entries once legs have been computed
    #[serde(default)]
    pub transfers: Vec<Transfer>,
    #[serde(default)]
    pub total_duration_minutes: u32,
}

impl DayItinerary {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            pois: Vec::new(),
            schedule: Vec::new(),
            transfers: Vec::new(),
            total_duration_minutes: 0,
        }
    }

    /// Whether `transfers` aligns with consecutive POI pairs
    pub fn transfers_aligned(&self) -> bool {
        if self.pois.len() <= 1 {
            return self.transfers.is_empty();
        }
        if self.transfers.len() != self.pois.len() - 1 {
            return false;
        }
        self.transfers
            .iter()
            .zip(self.pois.windows(2))
            .all(|(t, pair)| t.from_poi_id == pair[0].id && t.to_poi_id == pair[1].id)
    }
}

/// Task names dispatched by the planner's FIFO queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTask {
    /// (Re)generate day plans via the LLM
    Plan,
    /// Compute travel legs for every day
    Legs,
    /// Check budget, daily-time, and date-range constraints
    Validate,
    /// Analyze per-day POI balance
    Balance,
}

impl PlanTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTask::Plan => "plan",
            PlanTask::Legs => "legs",
            PlanTask::Validate => "validate",
            PlanTask::Balance => "balance",
        }
    }
}
