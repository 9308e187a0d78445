use chrono::Utc;
use deposit_heatmap::boundaries::{DEFAULT_BOUNDARY_KEY, combine, feature_postal_code};
use deposit_heatmap::distance::OUTLIER_THRESHOLD_MILES;
use deposit_heatmap::geocode::{GeocodeResult, GeocodeStore};
use deposit_heatmap::pipeline::{attach_coordinates, choropleth_data, distance_report, geocode_queries};
use deposit_heatmap::records::{BranchRecord, CustomerRecord};
use geojson::{Feature, FeatureCollection};

fn customer(address: &str, postal_code: &str, branch: &str, balance: f64) -> CustomerRecord {
    CustomerRecord {
        address: address.to_string(),
        postal_code: postal_code.to_string(),
        state_code: "CA".to_string(),
        branch_name: branch.to_string(),
        balance,
    }
}

fn zip_collection(codes: &[&str]) -> FeatureCollection {
    let features: Vec<Feature> = codes
        .iter()
        .map(|code| {
            serde_json::from_value(serde_json::json!({
                "type": "Feature",
                "properties": { "ZCTA5CE10": code },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-118.0, 34.0], [-118.2, 34.0], [-118.2, 34.2], [-118.0, 34.0]]]
                }
            }))
            .unwrap()
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn stored(address: &str, latitude: Option<f64>, longitude: Option<f64>) -> GeocodeResult {
    GeocodeResult {
        address: address.to_string(),
        latitude,
        longitude,
        geocoded_at: Utc::now(),
    }
}

#[test]
fn test_choropleth_scenario() {
    let records = vec![
        customer("1 A ST", "90001", "Glendora", 100.0),
        customer("2 B ST", "90002", "Glendora", 50.0),
        customer("3 C ST", "90001", "Glendora", 25.0),
    ];
    let boundaries = combine(vec![zip_collection(&["90001", "90002"]), zip_collection(&["90003"])]);
    assert_eq!(boundaries.features.len(), 3);

    let data = choropleth_data(&records, &boundaries, DEFAULT_BOUNDARY_KEY);

    let codes: Vec<String> = data
        .boundaries
        .features
        .iter()
        .filter_map(|f| feature_postal_code(f, DEFAULT_BOUNDARY_KEY))
        .collect();
    assert_eq!(codes, vec!["90001", "90002"]);
    assert_eq!(data.deposits_by_postal_code.len(), 2);
    assert_eq!(data.deposits_by_postal_code["90001"], 125.0);
    assert_eq!(data.deposits_by_postal_code["90002"], 50.0);
}

#[test]
fn test_unmapped_postal_codes_stay_in_aggregate() {
    let records = vec![
        customer("1 A ST", "90001", "Glendora", 10.0),
        customer("2 B ST", "99999", "Glendora", 20.0),
    ];
    let data = choropleth_data(&records, &zip_collection(&["90001", "90003"]), DEFAULT_BOUNDARY_KEY);
    assert_eq!(data.boundaries.features.len(), 1);
    assert_eq!(data.deposits_by_postal_code["99999"], 20.0);
}

#[test]
fn test_distance_scenario() {
    let footprint = vec![
        customer("1 A ST APT 4", "90001", "Glendora", 100.0),
        customer("2 B ST", "90002", "Glendora", 50.0),
    ];
    let queries = geocode_queries(&footprint);
    assert_eq!(queries, vec!["1 A ST 90001", "2 B ST 90002"]);

    let store = GeocodeStore::new(vec![
        stored(&queries[0], Some(34.0), Some(-118.0)),
        stored(&queries[1], None, None),
    ]);
    let branches = vec![BranchRecord {
        branch_name: "Glendora".to_string(),
        latitude: 34.0,
        longitude: -118.0,
        state: "CA".to_string(),
    }];

    let located = attach_coordinates(&footprint, &store);
    assert_eq!(located.len(), 2);
    assert!(located[1].1.is_none());

    let report = distance_report(&located, &branches, &footprint, OUTLIER_THRESHOLD_MILES);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].distance_miles, 0.0);
    assert_eq!(report.records[0].customer.postal_code, "90001");

    assert_eq!(report.summary.len(), 1);
    assert_eq!(report.summary[0].median, 0.0);
    assert_eq!(report.summary[0].balance_total, 150.0);
}

#[test]
fn test_outliers_excluded_from_summary_only() {
    let all = vec![
        customer("1 A ST", "90001", "Glendora", 10.0),
        customer("2 B ST", "96813", "Glendora", 20.0),
        customer("3 C ST", "10001", "Covina", 40.0),
    ];
    let footprint = all[..2].to_vec();
    let queries = geocode_queries(&footprint);
    let store = GeocodeStore::new(vec![
        stored(&queries[0], Some(34.1), Some(-118.0)),
        stored(&queries[1], Some(21.3), Some(-157.8)),
    ]);
    let branches = vec![BranchRecord {
        branch_name: "Glendora".to_string(),
        latitude: 34.0,
        longitude: -118.0,
        state: "CA".to_string(),
    }];

    let located = attach_coordinates(&footprint, &store);
    let report = distance_report(&located, &branches, &all, OUTLIER_THRESHOLD_MILES);

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.summary.len(), 1);
    let row = &report.summary[0];
    assert_eq!(row.customers, 1);
    assert!(row.mean < 10.0);
    // Balance totals come from every record, outliers included.
    assert_eq!(row.balance_total, 30.0);
}
