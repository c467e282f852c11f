//! External search and validation adapters
//!
//! Narrow interfaces over the unreliable outside world: web search, places
//! validation, and directions. Each degrades locally (empty results or
//! sentinel values) instead of failing the pipelines that consume it.

pub mod directions;
pub mod places;
pub mod web;

pub use directions::{DirectionsApi, DirectionsError, GoogleDirectionsApi, TravelLegCalculator};
pub use places::{GooglePlacesMapper, PoiMapper};
pub use web::{TavilySearch, WebSearch};
