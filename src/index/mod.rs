//! Vector index
//!
//! Content-addressed store of POI records keyed by `poi_id`. Rows carry the
//! embedding, the raw document text, and a flat metadata map of JSON scalars
//! from which the full `PoiRecord` is reconstructed on search. Inserts are
//! idempotent by id. Initialization is lazy: the first operation opens (or
//! creates) the collection.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub mod embedding;

pub use embedding::{Embedder, HashingEmbedder, HttpEmbedder};

use crate::config::IndexConfig;
use crate::domain::{OpeningHours, PoiCandidate, PoiCategory, PoiRecord, PoiSource};

/// Errors from vector index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index row error: {0}")]
    Row(#[from] serde_json::Error),

    #[error("embedding error: {0}")]
    Embedding(String),
}

/// One stored row
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRow {
    id: String,
    vector: Vec<f32>,
    document: String,
    metadata: Map<String, Value>,
}

#[derive(Default)]
struct Collection {
    rows: Vec<IndexRow>,
}

impl Collection {
    fn contains(&self, id: &str) -> bool {
        self.rows.iter().any(|r| r.id == id)
    }
}

/// Cosine-similarity index over POI records
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    path: Option<PathBuf>,
    collection: RwLock<Option<Collection>>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>, path: Option<PathBuf>) -> Self {
        Self {
            embedder,
            path,
            collection: RwLock::new(None),
        }
    }

    /// Index with the configured path and, absent an embedding endpoint, the
    /// hashing fallback embedder
    pub fn from_config(config: &IndexConfig) -> Self {
        let embedder: Arc<dyn Embedder> = match &config.embedding_base_url {
            Some(base_url) => Arc::new(HttpEmbedder::new(
                base_url.clone(),
                config.embedding_model.clone(),
                config.embedding_api_key(),
            )),
            None => Arc::new(HashingEmbedder::from_config(config)),
        };
        Self::new(embedder, config.vector_db_path.clone())
    }

    /// Open the collection if this is the first operation
    async fn ensure_open(&self) -> Result<(), IndexError> {
        {
            let guard = self.collection.read().await;
            if guard.is_some() {
                return Ok(());
            }
        }

        let mut guard = self.collection.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut collection = Collection::default();
        if let Some(path) = &self.path {
            if path.exists() {
                let content = fs::read_to_string(path)?;
                for line in content.lines().filter(|l| !l.trim().is_empty()) {
                    match serde_json::from_str::<IndexRow>(line) {
                        Ok(row) => collection.rows.push(row),
                        Err(e) => warn!(error = %e, "skipping undecodable index row"),
                    }
                }
                info!(rows = collection.rows.len(), path = %path.display(), "opened vector collection");
            } else if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        *guard = Some(collection);
        Ok(())
    }

    /// Append rows to the on-disk collection, if one is configured
    fn persist_rows(&self, rows: &[IndexRow]) -> Result<(), IndexError> {
        if rows.is_empty() {
            return Ok(());
        }
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        for row in rows {
            let line = serde_json::to_string(row)?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    /// Insert one record. Returns false when the id was already present.
    pub async fn add(&self, record: &PoiRecord) -> Result<bool, IndexError> {
        Ok(self.add_batch(std::slice::from_ref(record)).await? == 1)
    }

    /// Insert a batch of records, returning how many were actually inserted.
    ///
    /// In-batch duplicate ids keep the first occurrence; ids already present
    /// in the collection are skipped. Calling twice with the same batch
    /// leaves the index size unchanged the second time.
    pub async fn add_batch(&self, records: &[PoiRecord]) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.ensure_open().await?;

        // In-batch dedup, first occurrence wins
        let mut seen: HashSet<&str> = HashSet::new();
        let mut unique: Vec<&PoiRecord> = Vec::new();
        for record in records {
            if seen.insert(record.id.as_str()) {
                unique.push(record);
            }
        }

        // Drop ids already present before paying for embeddings
        {
            let guard = self.collection.read().await;
            let collection = guard.as_ref().expect("collection opened above");
            unique.retain(|r| !collection.contains(&r.id));
        }
        if unique.is_empty() {
            return Ok(0);
        }

        let documents: Vec<String> = unique.iter().map(|r| r.raw_text.clone()).collect();
        let vectors = self.embedder.embed_documents(&documents).await?;

        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().expect("collection opened above");

        let mut inserted = Vec::new();
        for (record, vector) in unique.iter().zip(vectors) {
            // Re-check under the write lock; a concurrent add may have won
            if collection.contains(&record.id) {
                continue;
            }
            let row = IndexRow {
                id: record.id.clone(),
                vector,
                document: record.raw_text.clone(),
                metadata: record_metadata(record),
            };
            collection.rows.push(row.clone());
            inserted.push(row);
        }

        self.persist_rows(&inserted)?;
        debug!(requested = records.len(), inserted = inserted.len(), "add_batch: done");
        Ok(inserted.len())
    }

    /// Similarity search by query text. An empty index returns an empty
    /// list, never an error.
    pub async fn search_by_text(
        &self,
        query: &str,
        k: usize,
        city_filter: Option<&str>,
    ) -> Result<Vec<(PoiCandidate, PoiRecord)>, IndexError> {
        self.ensure_open().await?;
        if self.size().await? == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query).await?;
        self.search_by_vector(&query_vector, k, city_filter).await
    }

    /// Similarity search by embedding vector
    pub async fn search_by_vector(
        &self,
        query: &[f32],
        k: usize,
        city_filter: Option<&str>,
    ) -> Result<Vec<(PoiCandidate, PoiRecord)>, IndexError> {
        self.ensure_open().await?;

        let guard = self.collection.read().await;
        let collection = guard.as_ref().expect("collection opened above");

        let mut scored: Vec<(f64, &IndexRow)> = collection
            .rows
            .iter()
            .filter(|row| match city_filter {
                Some(city) if !city.is_empty() => row.metadata.get("city").and_then(Value::as_str) == Some(city),
                _ => true,
            })
            .map(|row| (cosine_similarity(query, &row.vector), row))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(similarity, row)| {
                // relevance = 1 - cosine_distance, clamped into [0, 1]
                let relevance = similarity.clamp(0.0, 1.0);
                let record = record_from_metadata(&row.id, &row.metadata, &row.document);
                let candidate = PoiCandidate {
                    poi_id: Some(row.id.clone()),
                    title: record.name.clone(),
                    snippet: row.document.chars().take(500).collect(),
                    url: record.source_url.clone(),
                    source: PoiSource::Vector,
                    relevance,
                };
                (candidate, record)
            })
            .collect();

        Ok(hits)
    }

    /// Number of stored rows
    pub async fn size(&self) -> Result<usize, IndexError> {
        self.ensure_open().await?;
        let guard = self.collection.read().await;
        Ok(guard.as_ref().expect("collection opened above").rows.len())
    }
}

/// Cosine similarity; zero vectors score 0
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

fn scalar(s: &Option<String>) -> Value {
    Value::String(s.clone().unwrap_or_default())
}

/// Flatten a record into the metadata map. List- and object-typed fields
/// (`types`, `opening_hours`) are JSON-encoded strings; everything else is a
/// JSON scalar.
fn record_metadata(record: &PoiRecord) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("name".to_string(), Value::String(record.name.clone()));
    metadata.insert("category".to_string(), Value::String(record.category.as_str().to_string()));
    metadata.insert("description".to_string(), Value::String(record.description.clone()));
    metadata.insert("city".to_string(), scalar(&record.city));
    metadata.insert("address".to_string(), scalar(&record.address));
    metadata.insert("source".to_string(), Value::String(record.source.as_str().to_string()));
    metadata.insert("source_url".to_string(), scalar(&record.source_url));
    metadata.insert("created_at".to_string(), Value::String(record.created_at.to_rfc3339()));

    metadata.insert("google_place_id".to_string(), scalar(&record.google_place_id));
    metadata.insert(
        "latitude".to_string(),
        record.latitude.map(|v| serde_json::json!(v)).unwrap_or(Value::String(String::new())),
    );
    metadata.insert(
        "longitude".to_string(),
        record.longitude.map(|v| serde_json::json!(v)).unwrap_or(Value::String(String::new())),
    );
    metadata.insert("google_maps_uri".to_string(), scalar(&record.google_maps_uri));
    metadata.insert(
        "types".to_string(),
        Value::String(serde_json::to_string(&record.types).unwrap_or_else(|_| "[]".to_string())),
    );
    metadata.insert("primary_type".to_string(), scalar(&record.primary_type));
    metadata.insert(
        "rating".to_string(),
        record.rating.map(|v| serde_json::json!(v)).unwrap_or(Value::String(String::new())),
    );
    metadata.insert(
        "rating_count".to_string(),
        record.rating_count.map(|v| serde_json::json!(v)).unwrap_or(Value::String(String::new())),
    );
    metadata.insert("price_level".to_string(), scalar(&record.price_level));
    metadata.insert("price_range".to_string(), scalar(&record.price_range));
    metadata.insert("website_uri".to_string(), scalar(&record.website_uri));
    metadata.insert("phone_number".to_string(), scalar(&record.phone_number));
    metadata.insert(
        "opening_hours".to_string(),
        Value::String(
            record
                .opening_hours
                .as_ref()
                .and_then(|h| serde_json::to_string(h).ok())
                .unwrap_or_default(),
        ),
    );
    metadata
}

fn meta_string(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Rebuild a record from a stored row
fn record_from_metadata(id: &str, metadata: &Map<String, Value>, document: &str) -> PoiRecord {
    let types: Vec<String> = meta_string(metadata, "types")
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    let opening_hours: Option<OpeningHours> =
        meta_string(metadata, "opening_hours").and_then(|raw| serde_json::from_str(&raw).ok());

    let created_at = meta_string(metadata, "created_at")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    PoiRecord {
        id: id.to_string(),
        name: meta_string(metadata, "name").unwrap_or_default(),
        category: PoiCategory::parse(&meta_string(metadata, "category").unwrap_or_default()),
        description: meta_string(metadata, "description").unwrap_or_default(),
        city: meta_string(metadata, "city"),
        address: meta_string(metadata, "address"),
        source: PoiSource::parse(&meta_string(metadata, "source").unwrap_or_default()),
        source_url: meta_string(metadata, "source_url"),
        raw_text: document.to_string(),
        created_at,
        google_place_id: meta_string(metadata, "google_place_id"),
        latitude: metadata.get("latitude").and_then(Value::as_f64),
        longitude: metadata.get("longitude").and_then(Value::as_f64),
        google_maps_uri: meta_string(metadata, "google_maps_uri"),
        types,
        primary_type: meta_string(metadata, "primary_type"),
        rating: metadata.get("rating").and_then(Value::as_f64),
        rating_count: metadata.get("rating_count").and_then(Value::as_u64).map(|v| v as u32),
        price_level: meta_string(metadata, "price_level"),
        price_range: meta_string(metadata, "price_range"),
        website_uri: meta_string(metadata, "website_uri"),
        phone_number: meta_string(metadata, "phone_number"),
        opening_hours,
    }
}
