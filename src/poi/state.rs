//! Typed state for the POI discovery pipeline
//!
//! Every field is written by exactly one node, except `poi_data_map`, which
//! both parallel branches write into and which therefore carries a
//! commutative map-union reducer.

use std::collections::HashMap;

use crate::domain::{PoiCandidate, PoiRecord};

/// Discovery pipeline state
#[derive(Debug, Clone, Default)]
pub struct PoiState {
    pub persona: String,
    pub destination: String,

    pub keywords: Vec<String>,
    pub web_results: Vec<PoiCandidate>,
    pub vector_results: Vec<PoiCandidate>,
    pub reranked_web: Vec<PoiCandidate>,
    pub reranked_vector: Vec<PoiCandidate>,
    pub merged: Vec<PoiCandidate>,

    /// poi_id → record, written by both branches
    pub poi_data_map: HashMap<String, PoiRecord>,
    pub final_poi_data: Vec<PoiRecord>,
}

impl PoiState {
    pub fn new(persona: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }
}

/// Reducer for `poi_data_map`: map union, incoming wins on key collision.
///
/// Commutative for the branches' writes because a colliding key names the
/// same poi_id, hence the same POI.
pub fn merge_poi_data_map(existing: &mut HashMap<String, PoiRecord>, incoming: HashMap<String, PoiRecord>) {
    existing.extend(incoming);
}
