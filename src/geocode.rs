//! Address geocoding.
//!
//! Lookups run strictly one at a time: each call is bounded by a timeout and
//! followed by a fixed delay, whatever its outcome, to stay inside the
//! public geocoder's rate limit. A failed or timed-out lookup yields an
//! empty result and the batch carries on.
//!
//! Results are persisted to a [`GeocodeStore`] so an interrupted run can
//! resume without re-resolving addresses it already has coordinates for.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::distance::Coordinates;
use crate::error::PipelineError;
use crate::fetch::{HttpClient, fetch_bytes};

/// Latitude and longitude as reported by the service. Either may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A free-text geocoding backend.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    /// Resolves `query`. `Ok` with an empty [`Location`] means the service
    /// answered but found nothing.
    async fn lookup(&self, query: &str) -> Result<Location, PipelineError>;
}

/// Delay policy applied after every completed lookup.
#[async_trait]
pub trait RateLimit: Send + Sync {
    async fn after_call(&self);
}

/// Sleeps for a fixed duration after each call.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

#[async_trait]
impl RateLimit for FixedDelay {
    async fn after_call(&self) {
        tokio::time::sleep(self.0).await;
    }
}

/// Outcome of geocoding one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geocoded_at: DateTime<Utc>,
}

impl GeocodeResult {
    /// Both coordinates, when the lookup produced them.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.coordinates().is_some()
    }
}

/// Geocoding client: a service, a delay policy and a per-call timeout.
pub struct Geocoder<S, L> {
    service: S,
    limiter: L,
    timeout: Duration,
}

impl<S: GeocodingService, L: RateLimit> Geocoder<S, L> {
    pub fn new(service: S, limiter: L, timeout: Duration) -> Self {
        Self {
            service,
            limiter,
            timeout,
        }
    }

    /// Geocodes one address. Never fails: timeouts and service errors are
    /// logged and produce an empty result.
    pub async fn geocode(&self, address: &str) -> GeocodeResult {
        let outcome = match tokio::time::timeout(self.timeout, self.service.lookup(address)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Timeout {
                source_name: "geocoder".to_string(),
            }),
        };
        let location = match outcome {
            Ok(location) => location,
            Err(e) if e.is_timeout() => {
                warn!(address, timeout_secs = self.timeout.as_secs_f64(), "Geocode timed out");
                Location::default()
            }
            Err(e) => {
                warn!(address, error = %e, "Geocode failed");
                Location::default()
            }
        };
        self.limiter.after_call().await;

        GeocodeResult {
            address: address.to_string(),
            latitude: location.latitude,
            longitude: location.longitude,
            geocoded_at: Utc::now(),
        }
    }

    /// Geocodes `addresses` in order, returning exactly one result per input
    /// at the same position. Addresses already resolved in `previous` are
    /// reused without calling the service.
    #[tracing::instrument(skip_all, fields(addresses = addresses.len()))]
    pub async fn geocode_batch(
        &self,
        addresses: &[String],
        previous: &GeocodeStore,
    ) -> Vec<GeocodeResult> {
        let known = previous.index();
        let mut results = Vec::with_capacity(addresses.len());
        let mut reused = 0usize;

        for (i, address) in addresses.iter().enumerate() {
            if let Some(hit) = known.get(address.as_str()).filter(|r| r.is_resolved()) {
                reused += 1;
                results.push((*hit).clone());
                continue;
            }
            debug!(position = i, address = %address, "Geocoding");
            results.push(self.geocode(address).await);
        }

        let resolved = results.iter().filter(|r| r.is_resolved()).count();
        info!(
            total = results.len(),
            resolved,
            unresolved = results.len() - resolved,
            reused,
            "Geocode batch complete"
        );
        results
    }
}

/// Persisted geocode results, in batch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeocodeStore {
    pub results: Vec<GeocodeResult>,
}

impl GeocodeStore {
    pub fn new(results: Vec<GeocodeResult>) -> Self {
        Self { results }
    }

    /// Loads a store from `path`, or an empty one if the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading geocode store {}", path.display()))?;
        let store: Self = serde_json::from_str(&content)?;
        info!(path = %path.display(), results = store.results.len(), "Geocode store loaded");
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), results = self.results.len(), "Geocode store saved");
        Ok(())
    }

    /// Combines this store with a newer batch. Batch results replace stored
    /// entries for the same address; entries for other addresses are kept.
    pub fn merged_with(self, batch: Vec<GeocodeResult>) -> Self {
        let fresh: HashSet<&str> = batch.iter().map(|r| r.address.as_str()).collect();
        let mut results: Vec<GeocodeResult> = self
            .results
            .into_iter()
            .filter(|r| !fresh.contains(r.address.as_str()))
            .collect();
        results.extend(batch);
        Self { results }
    }

    /// Results keyed by address. Later entries win for duplicate addresses.
    pub fn index(&self) -> HashMap<&str, &GeocodeResult> {
        self.results
            .iter()
            .map(|r| (r.address.as_str(), r))
            .collect()
    }
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: Option<String>,
    lon: Option<String>,
}

/// [`GeocodingService`] backed by a Nominatim `/search` endpoint.
pub struct NominatimClient<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> NominatimClient<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, query: &str) -> Result<reqwest::Url, PipelineError> {
        reqwest::Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[("q", query), ("format", "jsonv2"), ("limit", "1")],
        )
        .map_err(|e| PipelineError::fetch(&self.base_url, e))
    }
}

#[async_trait]
impl<C: HttpClient> GeocodingService for NominatimClient<C> {
    async fn lookup(&self, query: &str) -> Result<Location, PipelineError> {
        let url = self.search_url(query)?;
        let bytes = fetch_bytes(&self.client, url.as_str()).await.map_err(|e| {
            let timed_out = e
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|re| re.is_timeout());
            if timed_out {
                PipelineError::Timeout {
                    source_name: self.base_url.clone(),
                }
            } else {
                PipelineError::fetch(&self.base_url, e)
            }
        })?;

        let places: Vec<NominatimPlace> =
            serde_json::from_slice(&bytes).map_err(|e| PipelineError::fetch(&self.base_url, e))?;

        Ok(places
            .into_iter()
            .next()
            .map(|place| Location {
                latitude: place.lat.and_then(|v| v.parse().ok()),
                longitude: place.lon.and_then(|v| v.parse().ok()),
            })
            .unwrap_or_default())
    }
}
