//! Customer deposit and branch reference records loaded from CSV.
//!
//! Rows that are missing required fields or fail to parse are skipped and
//! logged rather than aborting the run.

use anyhow::Result;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::error::PipelineError;

/// A single deposit account row joined to its customer's primary address.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomerRecord {
    #[serde(rename = "PrimaryAddress", alias = "Address")]
    pub address: String,
    #[serde(rename = "PrimaryAddressPostalCode")]
    pub postal_code: String,
    #[serde(rename = "PrimaryAddressStateCode")]
    pub state_code: String,
    #[serde(rename = "BranchName")]
    pub branch_name: String,
    #[serde(rename = "Balance")]
    pub balance: f64,
}

/// Static branch location reference data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BranchRecord {
    #[serde(rename = "BranchName")]
    pub branch_name: String,
    #[serde(rename = "Latitude_b", alias = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude_b", alias = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "State")]
    pub state: String,
}

/// Implemented by row types that carry fields the pipeline cannot do without.
trait Required {
    fn missing_field(&self) -> Option<&'static str>;
}

impl Required for CustomerRecord {
    fn missing_field(&self) -> Option<&'static str> {
        if self.address.trim().is_empty() {
            Some("address")
        } else if self.postal_code.trim().is_empty() {
            Some("postal code")
        } else if self.branch_name.trim().is_empty() {
            Some("branch name")
        } else if !self.balance.is_finite() {
            Some("balance")
        } else {
            None
        }
    }
}

impl Required for BranchRecord {
    fn missing_field(&self) -> Option<&'static str> {
        if self.branch_name.trim().is_empty() {
            Some("branch name")
        } else if !self.latitude.is_finite() || !self.longitude.is_finite() {
            Some("coordinates")
        } else {
            None
        }
    }
}

/// Reads customer records from a CSV file.
pub fn load_customers(path: impl AsRef<Path>) -> Result<Vec<CustomerRecord>> {
    let path = path.as_ref();
    let records = read_records(File::open(path)?)?;
    info!(path = %path.display(), records = records.len(), "Loaded customer records");
    Ok(records)
}

/// Reads branch reference records from a CSV file.
///
/// Branch files exported from spreadsheets are often Latin-1 encoded, so
/// bytes that are not valid UTF-8 are decoded as ISO-8859-1.
pub fn load_branches(path: impl AsRef<Path>) -> Result<Vec<BranchRecord>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    };
    let records = read_records(text.as_bytes())?;
    info!(path = %path.display(), records = records.len(), "Loaded branch records");
    Ok(records)
}

/// Deserializes every row of `reader`, skipping malformed ones.
fn read_records<T, R>(reader: R) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de> + Required,
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut row = csv::StringRecord::new();
    let mut records = Vec::new();
    let mut skipped = 0usize;

    loop {
        let malformed = match rdr.read_record(&mut row) {
            Ok(false) => break,
            Ok(true) => {
                let line = row.position().map(|p| p.line()).unwrap_or_default();
                match row.deserialize::<T>(Some(&headers)) {
                    Ok(record) => match record.missing_field() {
                        None => {
                            records.push(record);
                            continue;
                        }
                        Some(field) => PipelineError::MalformedRecord {
                            line,
                            reason: format!("missing {field}"),
                        },
                    },
                    Err(e) => PipelineError::MalformedRecord {
                        line,
                        reason: e.to_string(),
                    },
                }
            }
            Err(e) => PipelineError::MalformedRecord {
                line: e.position().map(|p| p.line()).unwrap_or_default(),
                reason: e.to_string(),
            },
        };
        skipped += 1;
        warn!(error = %malformed, "Skipping malformed row");
    }

    if skipped > 0 {
        warn!(skipped, kept = records.len(), "Malformed rows skipped");
    }
    Ok(records)
}

/// Keeps the records whose state code is in the footprint. An empty
/// footprint keeps everything.
pub fn in_footprint(records: &[CustomerRecord], states: &[String]) -> Vec<CustomerRecord> {
    if states.is_empty() {
        return records.to_vec();
    }
    let states: HashSet<String> = states.iter().map(|s| s.to_uppercase()).collect();
    records
        .iter()
        .filter(|r| states.contains(&r.state_code.to_uppercase()))
        .cloned()
        .collect()
}

/// Keeps the records serviced by one of `branches`. An empty list keeps everything.
pub fn for_branches(records: &[CustomerRecord], branches: &[String]) -> Vec<CustomerRecord> {
    if branches.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| branches.iter().any(|b| b == &r.branch_name))
        .cloned()
        .collect()
}

/// Total balance per postal code.
pub fn balance_by_postal_code(records: &[CustomerRecord]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for r in records {
        *totals.entry(r.postal_code.clone()).or_insert(0.0) += r.balance;
    }
    totals
}

/// Total balance per branch name.
pub fn balance_by_branch(records: &[CustomerRecord]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for r in records {
        *totals.entry(r.branch_name.clone()).or_insert(0.0) += r.balance;
    }
    totals
}

/// Postal codes whose aggregated balance is non-zero.
pub fn nonzero_postal_codes(totals: &BTreeMap<String, f64>) -> BTreeSet<String> {
    totals
        .iter()
        .filter(|(_, total)| **total != 0.0)
        .map(|(code, _)| code.clone())
        .collect()
}
