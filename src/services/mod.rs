//! Service layer for the donor search engine
//!
//! Services hold the search logic and depend on the repository traits, not
//! on concrete stores.
//!
//! - [`geohash_cache`]: FIFO cache bounded by count, bytes and age
//! - [`geohash_grouper`]: donor references bucketed by geohash prefix
//! - [`geohash_service`]: paged location queries and neighbor-ring expansion
//! - [`donor_search`]: the resumable search itself
//! - [`search_planning`]: donor counts and retry pacing for a blood request
//!
//! # Usage
//!
//! ```rust,ignore
//! use donor_search::services::{DonorSearchService, GeohashDonorCache};
//!
//! let service = DonorSearchService::new(locations, progress, config.search)?;
//! let mut cache = GeohashDonorCache::new(100, 10, 30)?;
//! let outcome = service.query_eligible_donors(&mut cache, &request).await?;
//! ```

pub mod donor_search;
pub mod geohash_cache;
pub mod geohash_grouper;
pub mod geohash_service;
pub mod search_planning;

pub use donor_search::{DonorSearchService, EligibleDonorAccumulator, GeohashDonorCache};
pub use geohash_cache::{BoundedCache, CacheStats};
pub use geohash_grouper::{GeohashGroup, group_by_prefix};
pub use geohash_service::{GeohashService, NeighborExpansion};
pub use search_planning::Urgency;
