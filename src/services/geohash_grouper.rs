//! Grouping of donor locations by geohash prefix

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{DonorLocation, DonorReference};
use crate::utils::geohash;

/// Donor references bucketed by geohash prefix
///
/// This is the value cached per (area, blood group, cache prefix) key, so it
/// holds only donor and location ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeohashGroup(HashMap<String, Vec<DonorReference>>);

impl GeohashGroup {
    /// Donors whose geohash starts with exactly this prefix
    pub fn donors_at(&self, prefix: &str) -> &[DonorReference] {
        self.0.get(prefix).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of references over all buckets
    pub fn total_references(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Bucket donors by the first `prefix_length` characters of their geohash
///
/// Input order is preserved inside each bucket and duplicates are kept.
pub fn group_by_prefix(donors: &[DonorLocation], prefix_length: usize) -> GeohashGroup {
    let mut groups: HashMap<String, Vec<DonorReference>> = HashMap::new();
    for donor in donors {
        groups
            .entry(geohash::truncate(&donor.geohash, prefix_length).to_string())
            .or_default()
            .push(donor.reference());
    }
    GeohashGroup(groups)
}
