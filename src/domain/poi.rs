//! POI data model
//!
//! `PoiRecord` is the authoritative, validated representation of a place.
//! `PoiCandidate` is an unvalidated search hit (web, vector, or feedback
//! sourced). `PoiSummary` is the LLM-produced intermediate that exists only
//! between summarization and places validation.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a POI cannot be validated against the external places API
#[derive(Debug, Error)]
#[error("poi validation failed: {0}")]
pub struct PoiValidationError(pub String);

/// POI category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiCategory {
    Restaurant,
    Cafe,
    Attraction,
    Accommodation,
    Shopping,
    Entertainment,
    Other,
}

impl PoiCategory {
    /// Parse a category string, falling back to `Other` for anything
    /// unrecognized (LLM output is not trusted to stay in vocabulary)
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "restaurant" => PoiCategory::Restaurant,
            "cafe" => PoiCategory::Cafe,
            "attraction" => PoiCategory::Attraction,
            "accommodation" => PoiCategory::Accommodation,
            "shopping" => PoiCategory::Shopping,
            "entertainment" => PoiCategory::Entertainment,
            _ => PoiCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoiCategory::Restaurant => "restaurant",
            PoiCategory::Cafe => "cafe",
            PoiCategory::Attraction => "attraction",
            PoiCategory::Accommodation => "accommodation",
            PoiCategory::Shopping => "shopping",
            PoiCategory::Entertainment => "entertainment",
            PoiCategory::Other => "other",
        }
    }
}

impl fmt::Display for PoiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a candidate or record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiSource {
    Web,
    Vector,
    Feedback,
}

impl PoiSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoiSource::Web => "web",
            PoiSource::Vector => "vector",
            PoiSource::Feedback => "feedback",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "vector" => PoiSource::Vector,
            "feedback" => PoiSource::Feedback,
            _ => PoiSource::Web,
        }
    }
}

/// Day of week, ISO 8601 numbering (Monday = 1, Sunday = 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DayOfWeek {
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
    Sunday = 7,
}

impl From<DayOfWeek> for u8 {
    fn from(d: DayOfWeek) -> u8 {
        d as u8
    }
}

impl TryFrom<u8> for DayOfWeek {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(DayOfWeek::Monday),
            2 => Ok(DayOfWeek::Tuesday),
            3 => Ok(DayOfWeek::Wednesday),
            4 => Ok(DayOfWeek::Thursday),
            5 => Ok(DayOfWeek::Friday),
            6 => Ok(DayOfWeek::Saturday),
            7 => Ok(DayOfWeek::Sunday),
            other => Err(format!("day of week out of range: {}", other)),
        }
    }
}

impl DayOfWeek {
    /// Iterate Monday through Sunday
    pub fn all() -> impl Iterator<Item = DayOfWeek> {
        (1u8..=7).map(|n| DayOfWeek::try_from(n).expect("1..=7 is always a valid day"))
    }
}

/// One open/close interval within a day. Half-open: a visit starting at
/// exactly `close_time` is outside the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

impl TimeSlot {
    /// Whether `t` falls inside the slot. Slots that wrap past midnight
    /// (e.g. 22:00-02:00) are handled.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.open_time <= self.close_time {
            self.open_time <= t && t < self.close_time
        } else {
            t >= self.open_time || t < self.close_time
        }
    }
}

/// Opening hours for a single day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyOpeningHours {
    pub day: DayOfWeek,
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
    #[serde(default)]
    pub is_closed: bool,
}

impl DailyOpeningHours {
    pub fn is_open_at(&self, t: NaiveTime) -> bool {
        !self.is_closed && self.slots.iter().any(|s| s.contains(t))
    }
}

/// Weekly opening hours: an ordered sequence of seven daily entries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpeningHours {
    #[serde(default)]
    pub periods: Vec<DailyOpeningHours>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<Vec<String>>,
}

impl OpeningHours {
    pub fn is_open_at(&self, at: NaiveDateTime) -> bool {
        let day = DayOfWeek::try_from(at.weekday().number_from_monday() as u8)
            .expect("number_from_monday is 1..=7");
        self.hours_for(day).map(|d| d.is_open_at(at.time())).unwrap_or(false)
    }

    pub fn hours_for(&self, day: DayOfWeek) -> Option<&DailyOpeningHours> {
        self.periods.iter().find(|p| p.day == day)
    }
}

/// Derive the stable POI id from the canonical source URL.
///
/// The id is the 32-hex MD5 of the URL, so re-validating the same URL always
/// yields the same id and vector-index inserts stay idempotent.
pub fn poi_id_from_url(url: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic stand-in URL for candidates that arrived without one
pub fn synthetic_source_url(name: &str, city: &str) -> String {
    format!("synthetic://poi/{}/{}", city.trim().to_lowercase(), name.trim().to_lowercase())
}

/// The authoritative POI: validated against the places API and persisted in
/// the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiRecord {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: PoiCategory,
    #[serde(default)]
    pub description: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub source: PoiSource,
    pub source_url: Option<String>,
    /// Embedding source string
    pub raw_text: String,
    pub created_at: DateTime<Utc>,

    // Places API fields
    pub google_place_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub google_maps_uri: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    pub primary_type: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<u32>,
    pub price_level: Option<String>,
    pub price_range: Option<String>,
    pub website_uri: Option<String>,
    pub phone_number: Option<String>,
    pub opening_hours: Option<OpeningHours>,
}

fn default_category() -> PoiCategory {
    PoiCategory::Other
}

impl PoiRecord {
    /// Minimal record with every optional field empty. Used by tests and by
    /// the vector-index reconstruction path before metadata is applied.
    pub fn bare(id: impl Into<String>, name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: PoiCategory::Other,
            description: String::new(),
            city: None,
            address: None,
            source: PoiSource::Web,
            source_url: None,
            raw_text: raw_text.into(),
            created_at: Utc::now(),
            google_place_id: None,
            latitude: None,
            longitude: None,
            google_maps_uri: None,
            types: Vec::new(),
            primary_type: None,
            rating: None,
            rating_count: None,
            price_level: None,
            price_range: None,
            website_uri: None,
            phone_number: None,
            opening_hours: None,
        }
    }
}

/// An unvalidated search hit from the web or vector branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiCandidate {
    /// Set once the hit has been validated (or when it came from the index)
    pub poi_id: Option<String>,
    pub title: String,
    pub snippet: String,
    pub url: Option<String>,
    pub source: PoiSource,
    /// Relevance in [0, 1]
    pub relevance: f64,
}

impl PoiCandidate {
    pub fn new(title: impl Into<String>, snippet: impl Into<String>, source: PoiSource) -> Self {
        Self {
            poi_id: None,
            title: title.into(),
            snippet: snippet.into(),
            url: None,
            source,
            relevance: 0.0,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = relevance;
        self
    }
}

/// LLM-produced per-POI summary, consumed by places validation and the
/// planner. Never exposed on the crate boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiSummary {
    pub id: String,
    pub name: String,
    pub category: PoiCategory,
    #[serde(default)]
    pub description: String,
    pub address: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

impl PoiSummary {
    /// Text used to embed this POI when no places data is available
    pub fn embedding_text(&self) -> String {
        let mut text = format!("{}.", self.name);
        if !self.description.is_empty() {
            text.push(' ');
            text.push_str(&self.description);
        }
        if let Some(address) = &self.address {
            text.push_str(&format!(" Location: {}", address));
        }
        if !self.highlights.is_empty() {
            text.push_str(&format!(" Highlights: {}", self.highlights.join(", ")));
        }
        text
    }
}
