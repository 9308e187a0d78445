//! Data handed to the external map renderer.
//!
//! The renderer draws a choropleth from `(postal code → value)` pairs keyed
//! on a feature property, and one marker per branch.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::records::BranchRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethLayer {
    /// Feature path the values join on, e.g. `feature.properties.ZCTA5CE10`.
    pub key_on: String,
    pub legend: String,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayers {
    pub choropleth: ChoroplethLayer,
    pub markers: Vec<Marker>,
}

impl MapLayers {
    pub fn new(
        boundary_key: &str,
        deposits_by_postal_code: BTreeMap<String, f64>,
        branches: &[BranchRecord],
    ) -> Self {
        Self {
            choropleth: ChoroplethLayer {
                key_on: format!("feature.properties.{boundary_key}"),
                legend: "Deposits by Zip Code".to_string(),
                values: deposits_by_postal_code,
            },
            markers: branches
                .iter()
                .map(|b| Marker {
                    latitude: b.latitude,
                    longitude: b.longitude,
                    label: b.branch_name.clone(),
                })
                .collect(),
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(
            path = %path.display(),
            regions = self.choropleth.values.len(),
            markers = self.markers.len(),
            "Map layers written"
        );
        Ok(())
    }
}
