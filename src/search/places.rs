//! Places validator
//!
//! Validates candidate POIs against the Places text-search API and enriches
//! them with coordinates, category, rating, and opening hours. Every
//! validated record gets its stable id derived from the canonical source
//! URL, so re-validation is idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::domain::{
    DailyOpeningHours, DayOfWeek, OpeningHours, PoiCategory, PoiRecord, PoiSource, PoiSummary, PoiValidationError,
    TimeSlot, poi_id_from_url, synthetic_source_url,
};

/// Concurrent validation calls per batch
const MAP_CONCURRENCY: usize = 5;

/// Fields requested from the places API
const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.location,\
places.types,places.primaryType,places.googleMapsUri,places.rating,places.userRatingCount,\
places.priceLevel,places.priceRange,places.websiteUri,places.internationalPhoneNumber,\
places.regularOpeningHours";

/// Search radius applied around the destination city, meters
const LOCATION_BIAS_RADIUS_M: f64 = 50_000.0;

/// Validates a summary against the external places API
#[async_trait]
pub trait PoiMapper: Send + Sync {
    /// Validate and enrich one summary. With `raise_on_failure` a miss is a
    /// `PoiValidationError`; otherwise it is `Ok(None)`.
    async fn map_summary(
        &self,
        summary: &PoiSummary,
        city: &str,
        source_url: Option<&str>,
        raise_on_failure: bool,
    ) -> Result<Option<PoiRecord>, PoiValidationError>;

    /// Validate a batch concurrently (bounded), keeping the successes
    async fn map_batch(&self, summaries: &[PoiSummary], city: &str) -> Vec<PoiRecord> {
        if summaries.is_empty() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(MAP_CONCURRENCY));
        let futures = summaries.iter().map(|summary| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match self.map_summary(summary, city, None, false).await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(name = %summary.name, error = %e, "batch validation failed");
                        None
                    }
                }
            }
        });

        let records: Vec<PoiRecord> = join_all(futures).await.into_iter().flatten().collect();
        info!(validated = records.len(), requested = summaries.len(), "map_batch: done");
        records
    }
}

/// Google Places (New) text-search mapper
pub struct GooglePlacesMapper {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    /// Destination city → coordinates, resolved once per instance
    city_locations: Mutex<HashMap<String, Option<(f64, f64)>>>,
}

impl GooglePlacesMapper {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url("https://places.googleapis.com/v1", api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            warn!("places API key not set; validation will fail");
        }
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            city_locations: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.places_api_key())
    }

    /// Issue one text search, returning the first place if any
    async fn search_place(
        &self,
        query: &str,
        field_mask: &str,
        location: Option<(f64, f64)>,
        included_type: Option<&str>,
    ) -> Result<Option<Value>, PoiValidationError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| PoiValidationError("places API key not set".to_string()))?;

        let mut payload = serde_json::json!({ "textQuery": query });
        if let Some(kind) = included_type {
            payload["includedType"] = serde_json::json!(kind);
        }
        if let Some((lat, lng)) = location {
            payload["locationRestriction"] = location_rectangle(lat, lng);
        }

        let response = self
            .http
            .post(format!("{}/places:searchText", self.base_url))
            .header("Content-Type", "application/json")
            .header("X-Goog-Api-Key", api_key)
            .header("X-Goog-FieldMask", field_mask)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PoiValidationError(format!("places request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PoiValidationError(format!("places API error {}: {}", status, body)));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| PoiValidationError(format!("undecodable places response: {}", e)))?;

        Ok(data["places"].as_array().and_then(|places| places.first().cloned()))
    }

    /// Resolve the destination city's coordinates, cached per instance.
    /// Searching with `includedType: locality` keeps same-named cafes and
    /// theme parks out of the answer.
    async fn resolve_city_location(&self, city: &str) -> Option<(f64, f64)> {
        {
            let cache = self.city_locations.lock().await;
            if let Some(cached) = cache.get(city) {
                return *cached;
            }
        }

        let location = match self
            .search_place(city, "places.location,places.displayName", None, Some("locality"))
            .await
        {
            Ok(Some(place)) => {
                let lat = place["location"]["latitude"].as_f64();
                let lng = place["location"]["longitude"].as_f64();
                lat.zip(lng)
            }
            Ok(None) => {
                warn!(city, "city location lookup found nothing");
                None
            }
            Err(e) => {
                warn!(city, error = %e, "city location lookup failed");
                None
            }
        };

        self.city_locations.lock().await.insert(city.to_string(), location);
        debug!(city, ?location, "resolved city location");
        location
    }
}

#[async_trait]
impl PoiMapper for GooglePlacesMapper {
    async fn map_summary(
        &self,
        summary: &PoiSummary,
        city: &str,
        source_url: Option<&str>,
        raise_on_failure: bool,
    ) -> Result<Option<PoiRecord>, PoiValidationError> {
        let fail = |message: String| {
            if raise_on_failure {
                Err(PoiValidationError(message))
            } else {
                Ok(None)
            }
        };

        if self.api_key.is_none() {
            return fail("places API key not set".to_string());
        }

        let location = self.resolve_city_location(city).await;

        // "{name} {city}" first, bare name as fallback
        let query = format!("{} {}", summary.name, city);
        let place = match self.search_place(&query, FIELD_MASK, location, None).await {
            Ok(Some(place)) => Some(place),
            Ok(None) => {
                debug!(%query, "no result, retrying with bare name");
                match self.search_place(&summary.name, FIELD_MASK, location, None).await {
                    Ok(place) => place,
                    Err(e) => return fail(e.to_string()),
                }
            }
            Err(e) => return fail(e.to_string()),
        };

        let Some(place) = place else {
            return fail(format!("place not found: {}", summary.name));
        };

        Ok(Some(record_from_place(summary, &place, city, source_url)))
    }
}

/// Rectangle roughly `LOCATION_BIAS_RADIUS_M` around a point. One degree of
/// latitude is about 111 km; longitude shrinks with cos(latitude).
fn location_rectangle(lat: f64, lng: f64) -> Value {
    let lat_offset = LOCATION_BIAS_RADIUS_M / 111_000.0;
    let lng_offset = LOCATION_BIAS_RADIUS_M / (111_000.0 * lat.to_radians().cos().abs().max(0.01));
    serde_json::json!({
        "rectangle": {
            "low": { "latitude": lat - lat_offset, "longitude": lng - lng_offset },
            "high": { "latitude": lat + lat_offset, "longitude": lng + lng_offset },
        }
    })
}

/// Place type → category table; unrecognized types land in `Other`
fn category_for_type(place_type: &str) -> Option<PoiCategory> {
    let category = match place_type {
        "restaurant" | "food" | "meal_takeaway" | "meal_delivery" => PoiCategory::Restaurant,
        "cafe" | "coffee_shop" | "bakery" => PoiCategory::Cafe,
        "tourist_attraction" | "museum" | "park" | "amusement_park" | "zoo" | "aquarium" => PoiCategory::Attraction,
        "lodging" | "hotel" | "motel" => PoiCategory::Accommodation,
        "shopping_mall" | "store" | "supermarket" => PoiCategory::Shopping,
        "night_club" | "movie_theater" | "bar" => PoiCategory::Entertainment,
        _ => return None,
    };
    Some(category)
}

/// Map the place's primary type, then its type list, to a category
pub(crate) fn map_category(primary_type: &str, types: &[String]) -> PoiCategory {
    if let Some(category) = category_for_type(primary_type) {
        return category;
    }
    types
        .iter()
        .find_map(|t| category_for_type(t))
        .unwrap_or(PoiCategory::Other)
}

/// Build the validated record from a places API response
fn record_from_place(summary: &PoiSummary, place: &Value, city: &str, source_url: Option<&str>) -> PoiRecord {
    let location = &place["location"];
    let types: Vec<String> = place["types"]
        .as_array()
        .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let primary_type = place["primaryType"].as_str().unwrap_or_default();
    let category = map_category(primary_type, &types);

    let name = place["displayName"]["text"].as_str().unwrap_or(&summary.name).to_string();
    let address = place["formattedAddress"].as_str().map(str::to_string);

    // Stable id: MD5 of the canonical source URL; synthesize one for
    // candidates that arrived without a URL
    let canonical_url = source_url
        .map(str::to_string)
        .unwrap_or_else(|| synthetic_source_url(&summary.name, city));
    let poi_id = poi_id_from_url(&canonical_url);

    let raw_text = build_raw_text(&name, &summary.description, address.as_deref(), &summary.highlights);

    PoiRecord {
        id: poi_id,
        name,
        category,
        description: summary.description.clone(),
        city: Some(city.to_string()),
        address,
        source: PoiSource::Web,
        source_url: Some(canonical_url),
        raw_text,
        created_at: Utc::now(),
        google_place_id: place["id"].as_str().map(str::to_string),
        latitude: location["latitude"].as_f64(),
        longitude: location["longitude"].as_f64(),
        google_maps_uri: place["googleMapsUri"].as_str().map(str::to_string),
        types,
        primary_type: (!primary_type.is_empty()).then(|| primary_type.to_string()),
        rating: place["rating"].as_f64(),
        rating_count: place["userRatingCount"].as_u64().map(|v| v as u32),
        price_level: place["priceLevel"].as_str().map(str::to_string),
        price_range: parse_price_range(&place["priceRange"]),
        website_uri: place["websiteUri"].as_str().map(str::to_string),
        phone_number: place["internationalPhoneNumber"].as_str().map(str::to_string),
        opening_hours: parse_opening_hours(&place["regularOpeningHours"]),
    }
}

/// Embedding source text for the record
fn build_raw_text(name: &str, description: &str, address: Option<&str>, highlights: &[String]) -> String {
    let mut parts = vec![name.to_string()];
    if !description.is_empty() {
        parts.push(description.to_string());
    }
    if let Some(address) = address {
        parts.push(format!("Location: {}", address));
    }
    if !highlights.is_empty() {
        parts.push(format!("Highlights: {}", highlights.join(", ")));
    }
    parts.join(". ")
}

/// "startPrice ~ endPrice" rendering of the price range object
fn parse_price_range(price_range: &Value) -> Option<String> {
    let format_price = |price: &Value| -> Option<String> {
        let units = price["units"].as_str()?;
        let currency = price["currencyCode"].as_str().unwrap_or_default();
        Some(format!("{} {}", units, currency).trim().to_string())
    };

    let start = format_price(&price_range["startPrice"]);
    let end = format_price(&price_range["endPrice"]);

    match (start, end) {
        (Some(start), Some(end)) => Some(format!("{} ~ {}", start, end)),
        (Some(start), None) => Some(format!("{} ~", start)),
        (None, Some(end)) => Some(format!("~ {}", end)),
        (None, None) => None,
    }
}

/// Parse `regularOpeningHours` into the seven-day model.
///
/// The places API numbers days 0=Sunday..6=Saturday; the model is ISO 8601
/// with Monday=1. Days without any period are marked closed.
fn parse_opening_hours(hours: &Value) -> Option<OpeningHours> {
    let periods = hours["periods"].as_array()?;

    let mut daily: HashMap<u8, DailyOpeningHours> = HashMap::new();
    for period in periods {
        let open = &period["open"];
        let Some(open_day) = open["day"].as_u64() else {
            continue;
        };

        let open_time = NaiveTime::from_hms_opt(
            open["hour"].as_u64().unwrap_or(0) as u32,
            open["minute"].as_u64().unwrap_or(0) as u32,
            0,
        );
        let close = &period["close"];
        let close_time = NaiveTime::from_hms_opt(
            close["hour"].as_u64().unwrap_or(23) as u32,
            close["minute"].as_u64().unwrap_or(59) as u32,
            0,
        );
        let (Some(open_time), Some(close_time)) = (open_time, close_time) else {
            warn!(?period, "unparseable opening period");
            continue;
        };

        let iso_day = if open_day == 0 { 7u8 } else { open_day as u8 };
        let Ok(day) = DayOfWeek::try_from(iso_day) else {
            continue;
        };

        daily
            .entry(iso_day)
            .or_insert_with(|| DailyOpeningHours {
                day,
                slots: Vec::new(),
                is_closed: false,
            })
            .slots
            .push(TimeSlot { open_time, close_time });
    }

    let periods = DayOfWeek::all()
        .map(|day| {
            daily.remove(&u8::from(day)).unwrap_or(DailyOpeningHours {
                day,
                slots: Vec::new(),
                is_closed: true,
            })
        })
        .collect();

    let raw_text = hours["weekdayDescriptions"]
        .as_array()
        .map(|lines| lines.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>())
        .filter(|lines: &Vec<String>| !lines.is_empty());

    Some(OpeningHours { periods, raw_text })
}
