//! Travel-leg calculator
//!
//! Computes duration and distance between consecutive POIs. Lookups are
//! memoized on `(from, to, mode)` for the life of the calculator, optionally
//! persisted to a JSONL sidecar. A missing API key or upstream failure
//! yields a zero-valued sentinel transfer; the planner is never failed by
//! directions.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::domain::{PoiRecord, Transfer, TravelMode};

/// Internal directions API failure; callers only ever see the sentinel
#[derive(Debug, Error)]
pub enum DirectionsError {
    #[error("directions API key not set")]
    MissingKey,

    #[error("directions request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directions response unusable: {0}")]
    Bad(String),
}

/// Raw route lookup between two POIs
#[async_trait]
pub trait DirectionsApi: Send + Sync {
    /// Returns (duration minutes, distance km)
    async fn route(&self, from: &PoiRecord, to: &PoiRecord, mode: TravelMode) -> Result<(u32, f64), DirectionsError>;
}

/// Google Directions API client
pub struct GoogleDirectionsApi {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleDirectionsApi {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url("https://maps.googleapis.com/maps/api/directions/json", api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl DirectionsApi for GoogleDirectionsApi {
    async fn route(&self, from: &PoiRecord, to: &PoiRecord, mode: TravelMode) -> Result<(u32, f64), DirectionsError> {
        let api_key = self.api_key.as_ref().ok_or(DirectionsError::MissingKey)?;

        // Address-based lookup, falling back to the place name
        let origin = from.address.as_deref().unwrap_or(&from.name);
        let destination = to.address.as_deref().unwrap_or(&to.name);

        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("origin", origin),
                ("destination", destination),
                ("mode", mode.as_str()),
                ("key", api_key),
            ])
            .send()
            .await?;

        let data: Value = response.json().await?;
        if data["status"].as_str() != Some("OK") {
            return Err(DirectionsError::Bad(format!(
                "status {}",
                data["status"].as_str().unwrap_or("missing")
            )));
        }

        let leg = &data["routes"][0]["legs"][0];
        let duration_secs = leg["duration"]["value"]
            .as_u64()
            .ok_or_else(|| DirectionsError::Bad("no duration".to_string()))?;
        let distance_meters = leg["distance"]["value"]
            .as_u64()
            .ok_or_else(|| DirectionsError::Bad("no distance".to_string()))?;

        Ok(((duration_secs / 60) as u32, distance_meters as f64 / 1000.0))
    }
}

type CacheKey = (String, String, TravelMode);

/// Memoizing travel-leg calculator
pub struct TravelLegCalculator {
    api: Arc<dyn DirectionsApi>,
    cache: Mutex<Option<HashMap<CacheKey, Transfer>>>,
    path: Option<PathBuf>,
}

impl TravelLegCalculator {
    pub fn new(api: Arc<dyn DirectionsApi>) -> Self {
        Self {
            api,
            cache: Mutex::new(None),
            path: None,
        }
    }

    pub fn with_persistence(api: Arc<dyn DirectionsApi>, config: &PlannerConfig) -> Self {
        Self {
            api,
            cache: Mutex::new(None),
            path: config.transfer_cache_path.clone(),
        }
    }

    /// Load the persisted cache on first use
    fn loaded_cache<'a>(&self, guard: &'a mut Option<HashMap<CacheKey, Transfer>>) -> &'a mut HashMap<CacheKey, Transfer> {
        if guard.is_none() {
            let mut cache = HashMap::new();
            if let Some(path) = &self.path {
                if path.exists() {
                    if let Ok(content) = fs::read_to_string(path) {
                        for line in content.lines().filter(|l| !l.trim().is_empty()) {
                            match serde_json::from_str::<Transfer>(line) {
                                Ok(t) => {
                                    cache.insert((t.from_poi_id.clone(), t.to_poi_id.clone(), t.mode), t);
                                }
                                Err(e) => warn!(error = %e, "skipping undecodable transfer cache row"),
                            }
                        }
                    }
                    debug!(entries = cache.len(), "loaded transfer cache");
                }
            }
            *guard = Some(cache);
        }
        guard.as_mut().expect("cache loaded above")
    }

    fn persist(&self, transfer: &Transfer) {
        let Some(path) = &self.path else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| match serde_json::to_string(transfer) {
                Ok(line) => writeln!(f, "{}", line),
                Err(e) => Err(std::io::Error::other(e)),
            });
        if let Err(e) = result {
            warn!(error = %e, "failed to persist transfer cache row");
        }
    }

    /// Travel leg between two POIs. Never fails: unavailable directions
    /// become a zero sentinel (mode preserved), which is also cached so a
    /// broken upstream is not hammered.
    pub async fn calc(&self, from: &PoiRecord, to: &PoiRecord, mode: TravelMode) -> Transfer {
        let key = (from.id.clone(), to.id.clone(), mode);
        {
            let mut guard = self.cache.lock().await;
            if let Some(cached) = self.loaded_cache(&mut guard).get(&key) {
                return cached.clone();
            }
        }

        let transfer = match self.api.route(from, to, mode).await {
            Ok((duration_minutes, distance_km)) => Transfer {
                from_poi_id: from.id.clone(),
                to_poi_id: to.id.clone(),
                mode,
                duration_minutes,
                distance_km,
            },
            Err(e) => {
                warn!(from = %from.name, to = %to.name, error = %e, "directions unavailable, using sentinel");
                Transfer::unavailable(&from.id, &to.id, mode)
            }
        };

        let mut guard = self.cache.lock().await;
        self.loaded_cache(&mut guard).insert(key, transfer.clone());
        self.persist(&transfer);
        transfer
    }

    /// Legs between each consecutive POI pair: `pois.len() - 1` transfers,
    /// in order
    pub async fn calc_sequence(&self, pois: &[PoiRecord], mode: TravelMode) -> Vec<Transfer> {
        let mut transfers = Vec::new();
        for pair in pois.windows(2) {
            transfers.push(self.calc(&pair[0], &pair[1], mode).await);
        }
        transfers
    }

    pub async fn cache_size(&self) -> usize {
        let mut guard = self.cache.lock().await;
        self.loaded_cache(&mut guard).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingApi {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DirectionsApi for CountingApi {
        async fn route(&self, _: &PoiRecord, _: &PoiRecord, _: TravelMode) -> Result<(u32, f64), DirectionsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DirectionsError::MissingKey)
            } else {
                Ok((20, 5.5))
            }
        }
    }

    fn record(id: &str) -> PoiRecord {
        PoiRecord::bare(id, id, id)
    }

    #[tokio::test]
    async fn test_calc_memoizes_per_key() {
        let api = Arc::new(CountingApi {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let calc = TravelLegCalculator::new(api.clone());

        let a = record("a");
        let b = record("b");

        let first = calc.calc(&a, &b, TravelMode::Driving).await;
        let second = calc.calc(&a, &b, TravelMode::Driving).await;
        assert_eq!(first, second);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        // Different mode is a different key
        calc.calc(&a, &b, TravelMode::Walking).await;
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(calc.cache_size().await, 2);
    }

    #[tokio::test]
    async fn test_failure_yields_sentinel() {
        let api = Arc::new(CountingApi {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let calc = TravelLegCalculator::new(api);

        let transfer = calc.calc(&record("a"), &record("b"), TravelMode::Transit).await;
        assert_eq!(transfer.duration_minutes, 0);
        assert_eq!(transfer.distance_km, 0.0);
        assert_eq!(transfer.mode, TravelMode::Transit);
    }

    #[tokio::test]
    async fn test_calc_sequence_length() {
        let api = Arc::new(CountingApi {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let calc = TravelLegCalculator::new(api);

        let pois = vec![record("a"), record("b"), record("c"), record("d")];
        let transfers = calc.calc_sequence(&pois, TravelMode::Driving).await;

        assert_eq!(transfers.len(), 3);
        assert_eq!(transfers[0].from_poi_id, "a");
        assert_eq!(transfers[2].to_poi_id, "d");

        let empty = calc.calc_sequence(&pois[..1], TravelMode::Driving).await;
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_persisted_cache_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfers.jsonl");
        let config = PlannerConfig {
            transfer_cache_path: Some(path.clone()),
            ..Default::default()
        };

        {
            let api = Arc::new(CountingApi {
                calls: AtomicUsize::new(0),
                fail: false,
            });
            let calc = TravelLegCalculator::with_persistence(api, &config);
            calc.calc(&record("a"), &record("b"), TravelMode::Driving).await;
        }

        let api = Arc::new(CountingApi {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let calc = TravelLegCalculator::with_persistence(api.clone(), &config);

        let transfer = calc.calc(&record("a"), &record("b"), TravelMode::Driving).await;
        assert_eq!(transfer.duration_minutes, 20);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0, "served from persisted cache");
    }
}
