//! Geohash encoding, neighbor expansion and great-circle distance
//!
//! All functions here are pure. Malformed geohashes never panic: decoding
//! returns `None` and the expansion helpers return empty results.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Precision used when a donor location is geohashed without an explicit length
pub const DEFAULT_PRECISION: usize = 8;

/// Longest geohash accepted by [`encode`]
pub const MAX_PRECISION: usize = 12;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Neighbor offsets in cell units as (latitude, longitude):
/// N, NE, E, SE, S, SW, W, NW
const NEIGHBOR_OFFSETS: [(f64, f64); 8] = [
    (1.0, 0.0),
    (1.0, 1.0),
    (0.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 0.0),
    (-1.0, -1.0),
    (0.0, -1.0),
    (1.0, -1.0),
];

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Area covered by a geohash cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            latitude: (self.min_latitude + self.max_latitude) / 2.0,
            longitude: (self.min_longitude + self.max_longitude) / 2.0,
        }
    }

    pub fn height(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    pub fn width(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }
}

/// Encode a coordinate into a geohash of `precision` characters
///
/// Returns `None` for non-finite or out-of-range coordinates and for a
/// precision outside `1..=MAX_PRECISION`.
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> Option<String> {
    if !(1..=MAX_PRECISION).contains(&precision)
        || !latitude.is_finite()
        || !longitude.is_finite()
        || !(-90.0..=90.0).contains(&latitude)
        || !(-180.0..=180.0).contains(&longitude)
    {
        return None;
    }

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut geohash = String::with_capacity(precision);
    let mut even_bit = true;

    while geohash.len() < precision {
        let mut index = 0usize;
        for _ in 0..5 {
            let (range, value) = if even_bit {
                (&mut lon_range, longitude)
            } else {
                (&mut lat_range, latitude)
            };
            let mid = (range.0 + range.1) / 2.0;
            index <<= 1;
            if value >= mid {
                index |= 1;
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            even_bit = !even_bit;
        }
        geohash.push(BASE32[index] as char);
    }

    Some(geohash)
}

/// Decode a geohash into the bounds of its cell
pub fn decode_bounds(geohash: &str) -> Option<BoundingBox> {
    if geohash.is_empty() {
        return None;
    }

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut even_bit = true;

    for byte in geohash.bytes() {
        let value = BASE32
            .iter()
            .position(|&c| c == byte.to_ascii_lowercase())?;
        for shift in (0..5).rev() {
            let range = if even_bit {
                &mut lon_range
            } else {
                &mut lat_range
            };
            let mid = (range.0 + range.1) / 2.0;
            if (value >> shift) & 1 == 1 {
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            even_bit = !even_bit;
        }
    }

    Some(BoundingBox {
        min_latitude: lat_range.0,
        max_latitude: lat_range.1,
        min_longitude: lon_range.0,
        max_longitude: lon_range.1,
    })
}

/// Decode a geohash into the center of its cell
pub fn decode(geohash: &str) -> Option<GeoPoint> {
    decode_bounds(geohash).map(|bounds| bounds.center())
}

/// The cells adjacent to `geohash` at the same precision
///
/// Ordered N, NE, E, SE, S, SW, W, NW. Longitude wraps at the antimeridian;
/// rows beyond a pole are omitted, so polar cells have fewer than eight.
pub fn neighbors(geohash: &str) -> Vec<String> {
    let Some(bounds) = decode_bounds(geohash) else {
        return Vec::new();
    };
    let center = bounds.center();
    let precision = geohash.len();

    NEIGHBOR_OFFSETS
        .iter()
        .filter_map(|(d_lat, d_lon)| {
            let latitude = center.latitude + d_lat * bounds.height();
            if !(-90.0..=90.0).contains(&latitude) {
                return None;
            }
            let mut longitude = center.longitude + d_lon * bounds.width();
            if longitude > 180.0 {
                longitude -= 360.0;
            } else if longitude < -180.0 {
                longitude += 360.0;
            }
            encode(latitude, longitude, precision)
        })
        .filter(|neighbor| neighbor != geohash)
        .collect()
}

/// Cells exactly `level` hops away from `geohash`
///
/// Breadth-first walk with a visited set: level 0 is the cell itself and
/// level k holds the not-yet-visited neighbors of level k-1. A cell never
/// appears in two levels. Malformed input yields an empty list.
pub fn nth_ring_neighbors(geohash: &str, level: u32) -> Vec<String> {
    if decode_bounds(geohash).is_none() {
        return Vec::new();
    }

    let mut visited: HashSet<String> = HashSet::from([geohash.to_string()]);
    let mut frontier = vec![geohash.to_string()];

    for _ in 0..level {
        let mut next = Vec::with_capacity(frontier.len() + 8);
        for cell in &frontier {
            for neighbor in neighbors(cell) {
                if visited.insert(neighbor.clone()) {
                    next.push(neighbor);
                }
            }
        }
        frontier = next;
        if frontier.is_empty() {
            break;
        }
    }

    frontier
}

/// Haversine distance between the centers of two cells, in kilometres
/// rounded to two decimals. `None` when either geohash is malformed.
pub fn distance_km(from: &str, to: &str) -> Option<f64> {
    let a = decode(from)?;
    let b = decode(to)?;
    Some(round_two_decimals(haversine_km(a, b)))
}

fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = lat_b - lat_a;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// First `length` characters of a geohash, or the whole string when shorter
pub fn truncate(geohash: &str, length: usize) -> &str {
    geohash.get(..length).unwrap_or(geohash)
}
