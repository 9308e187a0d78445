//! Postal-code boundary collections.
//!
//! Boundary datasets are fetched one per footprint state, concatenated into a
//! single `FeatureCollection`, then reduced to the postal codes that actually
//! carry deposits so the choropleth only draws relevant regions.

use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::fetch::{HttpClient, fetch_bytes};

/// Property holding the postal code in the census ZCTA boundary files.
pub const DEFAULT_BOUNDARY_KEY: &str = "ZCTA5CE10";

/// State code and lowercase name, as used in the per-state dataset file names.
static STATES: &[(&str, &str)] = &[
    ("AK", "alaska"),
    ("AL", "alabama"),
    ("AR", "arkansas"),
    ("AZ", "arizona"),
    ("CA", "california"),
    ("CO", "colorado"),
    ("CT", "connecticut"),
    ("DC", "district_of_columbia"),
    ("DE", "delaware"),
    ("FL", "florida"),
    ("GA", "georgia"),
    ("HI", "hawaii"),
    ("IA", "iowa"),
    ("ID", "idaho"),
    ("IL", "illinois"),
    ("IN", "indiana"),
    ("KS", "kansas"),
    ("KY", "kentucky"),
    ("LA", "louisiana"),
    ("MA", "massachusetts"),
    ("MD", "maryland"),
    ("ME", "maine"),
    ("MI", "michigan"),
    ("MN", "minnesota"),
    ("MO", "missouri"),
    ("MS", "mississippi"),
    ("MT", "montana"),
    ("NC", "north_carolina"),
    ("ND", "north_dakota"),
    ("NE", "nebraska"),
    ("NH", "new_hampshire"),
    ("NJ", "new_jersey"),
    ("NM", "new_mexico"),
    ("NV", "nevada"),
    ("NY", "new_york"),
    ("OH", "ohio"),
    ("OK", "oklahoma"),
    ("OR", "oregon"),
    ("PA", "pennsylvania"),
    ("RI", "rhode_island"),
    ("SC", "south_carolina"),
    ("SD", "south_dakota"),
    ("TN", "tennessee"),
    ("TX", "texas"),
    ("UT", "utah"),
    ("VA", "virginia"),
    ("VT", "vermont"),
    ("WA", "washington"),
    ("WI", "wisconsin"),
    ("WV", "west_virginia"),
    ("WY", "wyoming"),
];

/// Returns the dataset file name for a state code, e.g. `WA` →
/// `wa_washington_zip_codes_geo.min.json`.
pub fn region_dataset(state_code: &str) -> Option<String> {
    let code = state_code.trim().to_uppercase();
    STATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(c, name)| format!("{}_{}_zip_codes_geo.min.json", c.to_lowercase(), name))
}

/// A boundary dataset to download: a display name and its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSource {
    pub name: String,
    pub url: String,
}

/// Resolves footprint state codes to dataset URLs under `base_url`.
pub fn region_sources(base_url: &str, states: &[String]) -> Result<Vec<RegionSource>> {
    let base = base_url.trim_end_matches('/');
    states
        .iter()
        .map(|state| {
            let file = region_dataset(state)
                .with_context(|| format!("no boundary dataset known for state '{state}'"))?;
            Ok(RegionSource {
                name: state.to_uppercase(),
                url: format!("{base}/{file}"),
            })
        })
        .collect()
}

/// Parses a GeoJSON `FeatureCollection` document.
pub fn parse_collection(bytes: &[u8]) -> Result<FeatureCollection> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Fetches and parses one region's boundary dataset.
#[tracing::instrument(skip(client), fields(region = %source.name))]
pub async fn fetch_region<C: HttpClient>(
    client: &C,
    source: &RegionSource,
) -> Result<FeatureCollection, PipelineError> {
    let bytes = fetch_bytes(client, &source.url)
        .await
        .map_err(|e| PipelineError::fetch(&source.url, e))?;
    let collection = parse_collection(&bytes).map_err(|e| PipelineError::fetch(&source.url, e))?;
    debug!(features = collection.features.len(), "Region parsed");
    Ok(collection)
}

/// Concatenates the features of `collections` in order.
pub fn combine(collections: Vec<FeatureCollection>) -> FeatureCollection {
    let features: Vec<Feature> = collections.into_iter().flat_map(|c| c.features).collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Downloads every region and combines them. Any single failure aborts the
/// whole aggregation.
pub async fn fetch_and_combine<C: HttpClient>(
    client: &C,
    sources: &[RegionSource],
) -> Result<FeatureCollection, PipelineError> {
    let mut collections = Vec::with_capacity(sources.len());
    for source in sources {
        collections.push(fetch_region(client, source).await?);
    }
    let combined = combine(collections);
    info!(
        regions = sources.len(),
        features = combined.features.len(),
        "Boundary datasets combined"
    );
    Ok(combined)
}

/// Postal code of a feature under `key`. Numeric properties are rendered
/// as their decimal text.
pub fn feature_postal_code(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Keeps the features whose `key` property is in `postal_codes`, preserving
/// the collection's order.
pub fn filter_to_postal_codes(
    collection: &FeatureCollection,
    key: &str,
    postal_codes: &BTreeSet<String>,
) -> FeatureCollection {
    let features: Vec<Feature> = collection
        .features
        .iter()
        .filter(|f| feature_postal_code(f, key).is_some_and(|code| postal_codes.contains(&code)))
        .cloned()
        .collect();

    let mapped: BTreeSet<String> = features
        .iter()
        .filter_map(|f| feature_postal_code(f, key))
        .collect();
    let unmapped = postal_codes.difference(&mapped).count();
    info!(
        kept = features.len(),
        total = collection.features.len(),
        unmapped,
        "Boundaries filtered to deposit postal codes"
    );

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Renders a collection as GeoJSON text with sorted keys and four-space
/// indentation, so repeated runs produce identical files.
pub fn to_geojson_string(collection: &FeatureCollection) -> Result<String> {
    let value = sort_keys(serde_json::to_value(collection)?);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(&value, &mut ser)?;
    Ok(String::from_utf8(buf)?)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Writes a collection to `path` as deterministic GeoJSON.
pub fn write_collection(path: impl AsRef<Path>, collection: &FeatureCollection) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_geojson_string(collection)?)?;
    info!(path = %path.display(), features = collection.features.len(), "Boundary collection written");
    Ok(())
}

/// Reads a collection previously written with [`write_collection`].
pub fn read_collection(path: impl AsRef<Path>) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_collection(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn zip_feature(code: &str) -> Feature {
        let value = json!({
            "type": "Feature",
            "properties": { "ZCTA5CE10": code, "STATEFP10": "06" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-118.0, 34.0], [-118.1, 34.0], [-118.1, 34.1], [-118.0, 34.0]]]
            }
        });
        serde_json::from_value(value).unwrap()
    }

    fn collection(codes: &[&str]) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: codes.iter().map(|c| zip_feature(c)).collect(),
            foreign_members: None,
        }
    }

    fn codes(collection: &FeatureCollection) -> Vec<String> {
        collection
            .features
            .iter()
            .filter_map(|f| feature_postal_code(f, DEFAULT_BOUNDARY_KEY))
            .collect()
    }

    #[test]
    fn test_region_dataset_names() {
        assert_eq!(
            region_dataset("wa").as_deref(),
            Some("wa_washington_zip_codes_geo.min.json")
        );
        assert_eq!(
            region_dataset("DC").as_deref(),
            Some("dc_district_of_columbia_zip_codes_geo.min.json")
        );
        assert_eq!(region_dataset("ZZ"), None);
    }

    #[test]
    fn test_region_sources_unknown_state() {
        assert!(region_sources("http://x", &["CA".into(), "XX".into()]).is_err());
        let sources = region_sources("http://x/", &["hi".into()]).unwrap();
        assert_eq!(sources[0].url, "http://x/hi_hawaii_zip_codes_geo.min.json");
        assert_eq!(sources[0].name, "HI");
    }

    #[test]
    fn test_combine_preserves_count_and_order() {
        let combined = combine(vec![
            collection(&["98001", "98002"]),
            collection(&[]),
            collection(&["97001"]),
        ]);
        assert_eq!(combined.features.len(), 3);
        assert_eq!(codes(&combined), vec!["98001", "98002", "97001"]);
    }

    #[test]
    fn test_filter_to_postal_codes() {
        let all = collection(&["90003", "90001", "90002"]);
        let wanted: BTreeSet<String> = ["90001", "90002", "99999"].iter().map(|s| s.to_string()).collect();

        let filtered = filter_to_postal_codes(&all, DEFAULT_BOUNDARY_KEY, &wanted);
        assert_eq!(codes(&filtered), vec!["90001", "90002"]);
        assert!(filtered.features.len() <= all.features.len());
    }

    #[test]
    fn test_numeric_postal_code_property() {
        let feature: Feature = serde_json::from_value(json!({
            "type": "Feature",
            "properties": { "ZCTA5CE10": 90001 },
            "geometry": null
        }))
        .unwrap();
        assert_eq!(
            feature_postal_code(&feature, DEFAULT_BOUNDARY_KEY).as_deref(),
            Some("90001")
        );
        assert_eq!(feature_postal_code(&feature, "MISSING"), None);
    }

    #[test]
    fn test_geojson_string_is_sorted_and_indented() {
        let text = to_geojson_string(&collection(&["90001"])).unwrap();
        assert!(text.starts_with("{\n    \"features\": ["));
        let features_at = text.find("\"features\"").unwrap();
        let type_at = text.rfind("\"type\": \"FeatureCollection\"").unwrap();
        assert!(features_at < type_at);
        assert!(text.find("\"STATEFP10\"").unwrap() < text.find("\"ZCTA5CE10\"").unwrap());

        // Same input renders identically.
        assert_eq!(text, to_geojson_string(&collection(&["90001"])).unwrap());
    }

    #[test]
    fn test_write_and_read_collection() {
        let path = std::env::temp_dir().join("deposit_heatmap_test_boundaries.json");
        let _ = std::fs::remove_file(&path);

        write_collection(&path, &collection(&["90001", "90002"])).unwrap();
        let read = read_collection(&path).unwrap();
        assert_eq!(codes(&read), vec!["90001", "90002"]);

        std::fs::remove_file(&path).unwrap();
    }
}
