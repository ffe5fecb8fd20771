//! Shared helpers
//!
//! - `clock` for time sources
//! - `geohash` for cell encoding, neighbors and distances

pub mod clock;
pub mod geohash;

pub use clock::{Clock, ManualClock, SystemClock};
pub use geohash::GeoPoint;
