//! Core data model for POI discovery and itinerary planning
//!
//! Sibling value types with no back-references: `poi` holds the place model
//! (including opening hours), `itinerary` holds the trip model built on top
//! of it.

pub mod itinerary;
pub mod poi;

pub use itinerary::{DayItinerary, PlanTask, ScheduledVisit, Transfer, TravelMode};
pub use poi::{
    DailyOpeningHours, DayOfWeek, OpeningHours, PoiCandidate, PoiCategory, PoiRecord, PoiSource, PoiSummary,
    PoiValidationError, TimeSlot, poi_id_from_url, synthetic_source_url,
};
