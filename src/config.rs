//! Runtime configuration read from the environment (and `.env`).

use anyhow::{Context, Result};
use std::time::Duration;

use crate::boundaries::DEFAULT_BOUNDARY_KEY;
use crate::distance::OUTLIER_THRESHOLD_MILES;

const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_BOUNDARY_BASE_URL: &str =
    "https://raw.githubusercontent.com/OpenDataDE/State-zip-code-GeoJSON/master";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub geocode_timeout: Duration,
    pub geocode_delay: Duration,
    pub boundary_base_url: String,
    pub boundary_key: String,
    pub outlier_threshold_miles: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            geocoder_user_agent: default_user_agent(),
            geocode_timeout: Duration::from_secs(10),
            geocode_delay: Duration::from_secs(1),
            boundary_base_url: DEFAULT_BOUNDARY_BASE_URL.to_string(),
            boundary_key: DEFAULT_BOUNDARY_KEY.to_string(),
            outlier_threshold_miles: OUTLIER_THRESHOLD_MILES,
        }
    }
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

impl PipelineConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Blank values fall
    /// back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let seconds = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(v) => {
                    let secs: f64 = v
                        .trim()
                        .parse()
                        .with_context(|| format!("{key} must be a number of seconds"))?;
                    if !secs.is_finite() || secs < 0.0 {
                        anyhow::bail!("{key} must be a non-negative number of seconds");
                    }
                    Duration::try_from_secs_f64(secs)
                        .with_context(|| format!("{key} is out of range"))
                }
                None => Ok(default),
            }
        };

        let outlier_threshold_miles = match get("OUTLIER_THRESHOLD_MILES") {
            Some(v) => {
                let miles: f64 = v
                    .trim()
                    .parse()
                    .context("OUTLIER_THRESHOLD_MILES must be a number")?;
                if !(miles > 0.0) {
                    anyhow::bail!("OUTLIER_THRESHOLD_MILES must be positive");
                }
                miles
            }
            None => defaults.outlier_threshold_miles,
        };

        Ok(Self {
            geocoder_url: get("GEOCODER_URL").unwrap_or(defaults.geocoder_url),
            geocoder_user_agent: get("GEOCODER_USER_AGENT").unwrap_or(defaults.geocoder_user_agent),
            geocode_timeout: seconds("GEOCODE_TIMEOUT_SECS", defaults.geocode_timeout)?,
            geocode_delay: seconds("GEOCODE_DELAY_SECS", defaults.geocode_delay)?,
            boundary_base_url: get("BOUNDARY_BASE_URL").unwrap_or(defaults.boundary_base_url),
            boundary_key: get("BOUNDARY_KEY").unwrap_or(defaults.boundary_key),
            outlier_threshold_miles,
        })
    }
}
