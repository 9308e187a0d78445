//! Customer-to-branch distances.
//!
//! Distance is the planar Euclidean distance between the two points in
//! degrees, scaled by 100 and converted with the km-to-mile factor. It is a
//! rough approximation, not a geodesic distance, and is kept this way so
//! results stay comparable with earlier reports.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::records::{BranchRecord, CustomerRecord};

/// Distances at or beyond this many miles are treated as data-quality outliers.
pub const OUTLIER_THRESHOLD_MILES: f64 = 1000.0;

const DEGREE_SCALE: f64 = 100.0;
const KM_TO_MILES: f64 = 0.621371;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Approximate distance in miles between `a` and `b`.
pub fn distance_miles(a: Coordinates, b: Coordinates) -> f64 {
    let dlat = a.latitude - b.latitude;
    let dlon = a.longitude - b.longitude;
    (dlat.powi(2) + dlon.powi(2)).sqrt() * DEGREE_SCALE * KM_TO_MILES
}

/// A customer with resolved coordinates, their branch's location and the
/// distance between them.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecord {
    pub customer: CustomerRecord,
    pub customer_location: Coordinates,
    pub branch_location: Coordinates,
    pub distance_miles: f64,
}

/// Computes a [`DistanceRecord`] for every customer that has coordinates
/// and whose branch is known. Input order is preserved.
pub fn compute_distances(
    customers: &[(CustomerRecord, Option<Coordinates>)],
    branches: &[BranchRecord],
) -> Vec<DistanceRecord> {
    let branch_locations: HashMap<&str, Coordinates> = branches
        .iter()
        .map(|b| {
            (
                b.branch_name.as_str(),
                Coordinates {
                    latitude: b.latitude,
                    longitude: b.longitude,
                },
            )
        })
        .collect();

    let mut unresolved = 0usize;
    let mut unknown_branch = 0usize;
    let mut records = Vec::new();

    for (customer, location) in customers {
        let Some(customer_location) = *location else {
            unresolved += 1;
            continue;
        };
        let Some(&branch_location) = branch_locations.get(customer.branch_name.as_str()) else {
            unknown_branch += 1;
            warn!(branch = %customer.branch_name, "Customer branch missing from branch file");
            continue;
        };

        let distance = distance_miles(customer_location, branch_location);
        if !distance.is_finite() {
            warn!(address = %customer.address, "Non-finite distance, skipping");
            continue;
        }
        records.push(DistanceRecord {
            customer: customer.clone(),
            customer_location,
            branch_location,
            distance_miles: distance,
        });
    }

    info!(
        computed = records.len(),
        unresolved, unknown_branch, "Distances computed"
    );
    records
}

/// Drops records at or beyond `threshold` miles. Applying it twice is the
/// same as applying it once.
pub fn without_outliers(records: &[DistanceRecord], threshold: f64) -> Vec<DistanceRecord> {
    records
        .iter()
        .filter(|r| r.distance_miles < threshold)
        .cloned()
        .collect()
}
