//! Per-branch distance distribution and balance totals.

use anyhow::Result;
use csv::WriterBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::distance::DistanceRecord;

/// One line of the branch summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "BranchName")]
    pub branch_name: String,
    #[serde(rename = "Branch Balance")]
    pub balance_total: f64,
    #[serde(rename = "Customers")]
    pub customers: usize,
    #[serde(rename = "Mean")]
    pub mean: f64,
    #[serde(rename = "Median")]
    pub median: f64,
    #[serde(rename = "25 Percentile")]
    pub p25: f64,
    #[serde(rename = "75 Percentile")]
    pub p75: f64,
}

/// Arithmetic mean. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Quantile `q` (0.0–1.0) of `sorted`, linearly interpolated between the
/// closest ranks at position `(n - 1) * q`. Returns 0.0 for empty input.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = (n - 1) as f64 * q.clamp(0.0, 1.0);
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            let frac = pos - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Builds one [`SummaryRow`] per branch present in `records`.
///
/// `balance_totals` comes from the full deposit file, independently of which
/// records survived geocoding and outlier filtering. Branches missing from
/// it get a total of 0.
pub fn summarize(
    records: &[DistanceRecord],
    balance_totals: &BTreeMap<String, f64>,
) -> Vec<SummaryRow> {
    let mut by_branch: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in records {
        by_branch
            .entry(r.customer.branch_name.as_str())
            .or_default()
            .push(r.distance_miles);
    }

    by_branch
        .into_iter()
        .map(|(branch, mut distances)| {
            distances.sort_by(f64::total_cmp);
            SummaryRow {
                branch_name: branch.to_string(),
                balance_total: balance_totals.get(branch).copied().unwrap_or(0.0),
                customers: distances.len(),
                mean: mean(&distances),
                median: percentile(&distances, 0.5),
                p25: percentile(&distances, 0.25),
                p75: percentile(&distances, 0.75),
            }
        })
        .collect()
}

/// Writes the summary table to a CSV file, replacing any previous contents.
pub fn write_summary(path: impl AsRef<Path>, rows: &[SummaryRow]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Summary written");
    Ok(())
}

/// Logs every summary row.
pub fn log_summary(rows: &[SummaryRow]) {
    for row in rows {
        info!(
            branch = %row.branch_name,
            balance = row.balance_total,
            customers = row.customers,
            mean = %format!("{:.2}", row.mean),
            median = %format!("{:.2}", row.median),
            p25 = %format!("{:.2}", row.p25),
            p75 = %format!("{:.2}", row.p75),
            "Branch distance summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Coordinates;
    use crate::records::CustomerRecord;

    fn record(branch: &str, distance: f64) -> DistanceRecord {
        let origin = Coordinates {
            latitude: 0.0,
            longitude: 0.0,
        };
        DistanceRecord {
            customer: CustomerRecord {
                address: "1 TEST ST".into(),
                postal_code: "90001".into(),
                state_code: "CA".into(),
                branch_name: branch.into(),
                balance: 1.0,
            },
            customer_location: origin,
            branch_location: origin,
            distance_miles: distance,
        }
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.5), 2.5);
        assert_eq!(percentile(&values, 0.25), 1.75);
        assert_eq!(percentile(&values, 0.75), 3.25);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 1.0), 4.0);
    }

    #[test]
    fn test_percentile_edge_cases() {
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(percentile(&[7.0], 0.25), 7.0);
        assert_eq!(percentile(&[2.0, 2.0, 2.0], 0.75), 2.0);
    }

    #[test]
    fn test_mean_with_empty_input() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
    }

    #[test]
    fn test_summarize_groups_by_branch() {
        let records = vec![
            record("Glendora", 4.0),
            record("Covina", 10.0),
            record("Glendora", 1.0),
            record("Glendora", 3.0),
            record("Glendora", 2.0),
        ];
        let balances: BTreeMap<String, f64> = [
            ("Glendora".to_string(), 500.0),
            ("Azusa".to_string(), 75.0),
        ]
        .into_iter()
        .collect();

        let rows = summarize(&records, &balances);
        assert_eq!(rows.len(), 2);

        let glendora = rows.iter().find(|r| r.branch_name == "Glendora").unwrap();
        assert_eq!(glendora.customers, 4);
        assert_eq!(glendora.balance_total, 500.0);
        assert_eq!(glendora.mean, 2.5);
        assert_eq!(glendora.median, 2.5);
        assert_eq!(glendora.p25, 1.75);
        assert_eq!(glendora.p75, 3.25);

        let covina = rows.iter().find(|r| r.branch_name == "Covina").unwrap();
        assert_eq!(covina.balance_total, 0.0);
        assert_eq!(covina.median, 10.0);

        assert!(rows.iter().all(|r| r.branch_name != "Azusa"));
    }

    #[test]
    fn test_write_summary() {
        let path = std::env::temp_dir().join("deposit_heatmap_test_summary.csv");
        let _ = std::fs::remove_file(&path);

        let rows = summarize(&[record("Glendora", 2.0)], &BTreeMap::new());
        write_summary(&path, &rows).unwrap();
        write_summary(&path, &rows).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("BranchName,Branch Balance,Customers,Mean"));

        std::fs::remove_file(&path).unwrap();
    }
}
