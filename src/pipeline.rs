//! Glue between the stages. Each step takes its inputs explicitly and
//! returns its outputs; nothing is shared between stages.

use geojson::FeatureCollection;
use std::collections::BTreeMap;
use tracing::info;

use crate::address::geocoder_query;
use crate::boundaries::filter_to_postal_codes;
use crate::distance::{Coordinates, DistanceRecord, compute_distances, without_outliers};
use crate::geocode::GeocodeStore;
use crate::records::{
    BranchRecord, CustomerRecord, balance_by_branch, balance_by_postal_code, nonzero_postal_codes,
};
use crate::summary::{SummaryRow, summarize};

/// Output of the postal-code side of the pipeline.
#[derive(Debug, Clone)]
pub struct ChoroplethData {
    pub boundaries: FeatureCollection,
    pub deposits_by_postal_code: BTreeMap<String, f64>,
}

/// Aggregates deposits by postal code and reduces `boundaries` to the postal
/// codes with a non-zero total.
pub fn choropleth_data(
    records: &[CustomerRecord],
    boundaries: &FeatureCollection,
    boundary_key: &str,
) -> ChoroplethData {
    let deposits_by_postal_code = balance_by_postal_code(records);
    let codes = nonzero_postal_codes(&deposits_by_postal_code);
    ChoroplethData {
        boundaries: filter_to_postal_codes(boundaries, boundary_key, &codes),
        deposits_by_postal_code,
    }
}

/// Geocoder queries for `records`, one per record in the same order.
pub fn geocode_queries(records: &[CustomerRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| geocoder_query(&r.address, &r.postal_code))
        .collect()
}

/// Pairs each record with the coordinates stored for its geocoder query.
/// Records whose query is absent from the store, or unresolved, get `None`.
pub fn attach_coordinates(
    records: &[CustomerRecord],
    store: &GeocodeStore,
) -> Vec<(CustomerRecord, Option<Coordinates>)> {
    let index = store.index();
    let paired: Vec<_> = records
        .iter()
        .zip(geocode_queries(records))
        .map(|(record, query)| {
            let coordinates = index.get(query.as_str()).and_then(|r| r.coordinates());
            (record.clone(), coordinates)
        })
        .collect();

    let resolved = paired.iter().filter(|(_, c)| c.is_some()).count();
    info!(records = paired.len(), resolved, "Coordinates attached");
    paired
}

/// Distance records plus the per-branch summary built from them.
#[derive(Debug, Clone)]
pub struct DistanceReport {
    pub records: Vec<DistanceRecord>,
    pub summary: Vec<SummaryRow>,
}

/// Computes distances for the footprint records and summarizes them.
///
/// `all_records` is the complete deposit file and only feeds the branch
/// balance totals. The outlier filter applies to the summary statistics;
/// `records` in the report keeps every computed distance.
pub fn distance_report(
    located: &[(CustomerRecord, Option<Coordinates>)],
    branches: &[BranchRecord],
    all_records: &[CustomerRecord],
    outlier_threshold_miles: f64,
) -> DistanceReport {
    let records = compute_distances(located, branches);
    let kept = without_outliers(&records, outlier_threshold_miles);
    info!(
        computed = records.len(),
        outliers = records.len() - kept.len(),
        threshold = outlier_threshold_miles,
        "Outlier filter applied"
    );
    let summary = summarize(&kept, &balance_by_branch(all_records));
    DistanceReport { records, summary }
}
