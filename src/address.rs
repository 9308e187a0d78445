//! Street-address cleanup ahead of geocoding.
//!
//! Unit-level detail lowers the geocoder's match rate, so trailing
//! apartment/unit/suite/space qualifiers are cut off before lookup.

use regex::Regex;
use std::sync::LazyLock;

/// Qualifier patterns, applied in this order. Each one removes the token and
/// everything after it.
static QUALIFIERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r" #.*", r" APT.*", r" UNIT.*", r" SUIT.*", r" SPC .*"]
        .iter()
        .map(|p| Regex::new(p).expect("qualifier pattern is valid"))
        .collect()
});

/// Strips unit qualifiers from `address`. Returns the input unchanged when
/// none match.
pub fn normalize_address(address: &str) -> String {
    QUALIFIERS
        .iter()
        .fold(address.to_string(), |acc, re| re.replace(&acc, "").into_owned())
}

/// Builds the free-text query sent to the geocoder: the cleaned street
/// address followed by the postal code.
pub fn geocoder_query(address: &str, postal_code: &str) -> String {
    format!("{} {}", normalize_address(address), postal_code)
}
