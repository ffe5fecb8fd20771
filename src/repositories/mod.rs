//! Repository layer for data access abstraction
//!
//! The traits describe what the search engine needs from storage; the
//! in-memory implementations back the command line tool and the tests.

pub mod in_memory;
pub mod traits;

pub use in_memory::{InMemoryLocationRepository, InMemorySearchProgressRepository};
pub use traits::{
    LocationPage, LocationPartitionQuery, LocationRepository, PageToken,
    SearchProgressRepository,
};
