//! Repository trait definitions
//!
//! The search engine consumes two stores: the location store, queried by
//! partition with pagination, and the search-progress store, which holds
//! the checkpoint every invocation resumes from. Errors from either are
//! returned unchanged to the caller.

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::models::{BloodGroup, DonorLocation, SearchKey, SearchProgress};

/// Opaque continuation token returned by a paged query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

/// Selects available donors of one blood group in an area
///
/// # Fields
///
/// * `geo_partition` - Store partition (geohash prefix); `None` scans the whole area
/// * `from_geohash` - Only locations whose geohash starts with this prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPartitionQuery {
    pub area: String,
    pub geo_partition: Option<String>,
    pub blood_group: BloodGroup,
    pub from_geohash: Option<String>,
}

impl LocationPartitionQuery {
    /// Query matching every available donor of `blood_group` in `area`
    pub fn whole_area(area: impl Into<String>, blood_group: BloodGroup) -> Self {
        Self {
            area: area.into(),
            geo_partition: None,
            blood_group,
            from_geohash: None,
        }
    }
}

/// One page of a partition query
#[derive(Debug, Clone, Default)]
pub struct LocationPage {
    pub items: Vec<DonorLocation>,
    pub next_page_token: Option<PageToken>,
}

/// Read access to donor locations
///
/// Only locations flagged as available for donation are returned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocationRepository: Send + Sync {
    /// Fetch one page of locations matching `query`
    ///
    /// # Returns
    ///
    /// * `Ok(LocationPage)` - Matching locations and, when more remain, a token
    /// * `Err(RepositoryError)` - Store failure or an undecodable record
    async fn query_by_partition(
        &self,
        query: &LocationPartitionQuery,
        page_token: Option<PageToken>,
    ) -> RepositoryResult<LocationPage>;
}

/// Persistence of search checkpoints
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProgressRepository: Send + Sync {
    /// Load the checkpoint of a search, `Ok(None)` if it never ran
    async fn get(&self, key: &SearchKey) -> RepositoryResult<Option<SearchProgress>>;

    /// Create or replace the checkpoint of a search
    async fn put(&self, key: &SearchKey, progress: &SearchProgress) -> RepositoryResult<()>;
}
