//! In-memory store implementations
//!
//! Locations are kept in their persisted record shape and decoded on read,
//! so malformed rows surface the same way they would from a real store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::trace;

use super::traits::{
    LocationPage, LocationPartitionQuery, LocationRepository, PageToken,
    SearchProgressRepository,
};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::donor_location::{parse_partition_key, partition_key};
use crate::models::{DonorLocation, LocationRecord, SearchKey, SearchProgress};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Location store held in memory, ordered by geohash within a partition
pub struct InMemoryLocationRepository {
    records: RwLock<Vec<LocationRecord>>,
    page_size: usize,
    queries: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryLocationRepository {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Store returning at most `page_size` items per page (minimum 1)
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            page_size: page_size.max(1),
            queries: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub async fn from_locations(
        locations: impl IntoIterator<Item = DonorLocation>,
        page_size: usize,
    ) -> Self {
        let repository = Self::with_page_size(page_size);
        for location in locations {
            repository.insert(&location).await;
        }
        repository
    }

    /// Store a location, replacing any previous row for the same donor location
    pub async fn insert(&self, location: &DonorLocation) {
        self.insert_record(LocationRecord::from_location(location))
            .await;
    }

    pub async fn insert_record(&self, record: LocationRecord) {
        let mut records = self.records.write().await;
        records.retain(|existing| !(existing.pk == record.pk && existing.sk == record.sk));
        records.push(record);
    }

    /// Number of page requests served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Make every following query fail with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn matches(query: &LocationPartitionQuery, record: &LocationRecord) -> bool {
        let in_partition = match &query.geo_partition {
            Some(geo_partition) => {
                record.gsi1pk == partition_key(&query.area, geo_partition, query.blood_group, true)
            }
            None => parse_partition_key(&record.gsi1pk).is_some_and(|parts| {
                parts.area == query.area
                    && parts.blood_group == query.blood_group.as_ref()
                    && parts.available_for_donation
            }),
        };

        in_partition
            && query
                .from_geohash
                .as_deref()
                .is_none_or(|prefix| record.gsi1sk.starts_with(prefix))
    }
}

impl Default for InMemoryLocationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationRepository for InMemoryLocationRepository {
    async fn query_by_partition(
        &self,
        query: &LocationPartitionQuery,
        page_token: Option<PageToken>,
    ) -> RepositoryResult<LocationPage> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::ConnectionFailed {
                message: "location store unavailable".to_string(),
            });
        }

        let offset = match &page_token {
            Some(PageToken(token)) => token.parse::<usize>().map_err(|_| {
                RepositoryError::query_failed("query_by_partition", format!("bad page token '{token}'"))
            })?,
            None => 0,
        };

        let records = self.records.read().await;
        let mut matching: Vec<&LocationRecord> = records
            .iter()
            .filter(|record| Self::matches(query, record))
            .collect();
        matching.sort_by(|a, b| a.gsi1sk.cmp(&b.gsi1sk));

        let end = (offset + self.page_size).min(matching.len());
        let items = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|record| DonorLocation::try_from((*record).clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let next_page_token = (end < matching.len()).then(|| PageToken(end.to_string()));

        trace!(
            area = %query.area,
            partition = ?query.geo_partition,
            from_geohash = ?query.from_geohash,
            offset,
            returned = items.len(),
            "served location page"
        );

        Ok(LocationPage {
            items,
            next_page_token,
        })
    }
}

/// Search-progress store held in memory
#[derive(Default)]
pub struct InMemorySearchProgressRepository {
    progress: RwLock<HashMap<(String, String), SearchProgress>>,
}

impl InMemorySearchProgressRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.progress.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.progress.read().await.is_empty()
    }
}

#[async_trait]
impl SearchProgressRepository for InMemorySearchProgressRepository {
    async fn get(&self, key: &SearchKey) -> RepositoryResult<Option<SearchProgress>> {
        let progress = self.progress.read().await;
        Ok(progress
            .get(&(key.partition_key(), key.sort_key()))
            .cloned())
    }

    async fn put(&self, key: &SearchKey, progress: &SearchProgress) -> RepositoryResult<()> {
        self.progress
            .write()
            .await
            .insert((key.partition_key(), key.sort_key()), progress.clone());
        Ok(())
    }
}
