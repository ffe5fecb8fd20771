//! Location queries and neighbor-ring expansion around a seeker

use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::SearchConfig;
use crate::errors::RepositoryResult;
use crate::models::donor_location::GEO_PARTITION_PREFIX_LENGTH;
use crate::models::{BloodGroup, DonorLocation};
use crate::repositories::{LocationPartitionQuery, LocationRepository};
use crate::utils::geohash;

/// Cells queued by one ring expansion, and the ring reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborExpansion {
    pub geohashes: Vec<String>,
    pub neighbor_level: u32,
}

pub struct GeohashService {
    location_repository: Arc<dyn LocationRepository>,
    max_neighbor_search_level: u32,
    max_geohashes_per_execution: usize,
}

impl GeohashService {
    pub fn new(location_repository: Arc<dyn LocationRepository>, config: &SearchConfig) -> Self {
        Self {
            location_repository,
            max_neighbor_search_level: config.max_neighbor_search_level,
            max_geohashes_per_execution: config.max_geohashes_per_execution,
        }
    }

    /// All available donors of a blood group whose geohash starts with `geohash`
    ///
    /// The store partition is derived from the geohash; every page is read
    /// before returning.
    pub async fn query_geohash(
        &self,
        area: &str,
        blood_group: BloodGroup,
        geohash: &str,
    ) -> RepositoryResult<Vec<DonorLocation>> {
        let query = LocationPartitionQuery {
            area: area.to_string(),
            geo_partition: Some(geohash::truncate(geohash, GEO_PARTITION_PREFIX_LENGTH).to_string()),
            blood_group,
            from_geohash: (!geohash.is_empty()).then(|| geohash.to_string()),
        };
        self.drain_pages(&query).await
    }

    /// All available donors of a blood group anywhere in the area
    pub async fn query_area(
        &self,
        area: &str,
        blood_group: BloodGroup,
    ) -> RepositoryResult<Vec<DonorLocation>> {
        self.drain_pages(&LocationPartitionQuery::whole_area(area, blood_group))
            .await
    }

    async fn drain_pages(
        &self,
        query: &LocationPartitionQuery,
    ) -> RepositoryResult<Vec<DonorLocation>> {
        let mut donors = Vec::new();
        let mut page_token = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .location_repository
                .query_by_partition(query, page_token)
                .await?;
            pages += 1;
            donors.extend(page.items);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(
            area = %query.area,
            partition = ?query.geo_partition,
            from_geohash = ?query.from_geohash,
            pages,
            donors = donors.len(),
            "location query completed"
        );
        Ok(donors)
    }

    /// Append successive rings around `geohash` to `current_geohashes`
    ///
    /// Starting after ring `neighbor_level`, rings are added until at least
    /// `max_geohashes_per_execution` cells are queued or the maximum search
    /// level is reached. Returns the queue and the last ring added.
    pub fn get_neighbor_geohashes(
        &self,
        geohash: &str,
        neighbor_level: u32,
        current_geohashes: Vec<String>,
    ) -> NeighborExpansion {
        let mut geohashes = current_geohashes;
        let mut level = neighbor_level;

        while geohashes.len() < self.max_geohashes_per_execution
            && level < self.max_neighbor_search_level
        {
            level += 1;
            let ring = geohash::nth_ring_neighbors(geohash, level);
            trace!(geohash, level, cells = ring.len(), "expanded neighbor ring");
            geohashes.extend(ring);
        }

        NeighborExpansion {
            geohashes,
            neighbor_level: level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RepositoryError;
    use crate::repositories::traits::MockLocationRepository;
    use crate::repositories::{LocationPage, PageToken};

    fn config(max_level: u32, per_execution: usize) -> SearchConfig {
        SearchConfig {
            max_neighbor_search_level: max_level,
            max_geohashes_per_execution: per_execution,
            ..SearchConfig::default()
        }
    }

    fn donor(id: &str, geohash: &str) -> DonorLocation {
        DonorLocation {
            donor_id: id.to_string(),
            location_id: format!("{id}-loc"),
            area: "BD".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            geohash: geohash.to_string(),
            blood_group: BloodGroup::APositive,
            available_for_donation: true,
            last_vaccinated_date: None,
        }
    }

    #[tokio::test]
    async fn test_query_geohash_drains_every_page() {
        let mut repository = MockLocationRepository::new();
        repository
            .expect_query_by_partition()
            .withf(|query, token| {
                query.geo_partition.as_deref() == Some("w4rq")
                    && query.from_geohash.as_deref() == Some("w4rq8")
                    && token.is_none()
            })
            .times(1)
            .returning(|_, _| {
                Ok(LocationPage {
                    items: vec![donor("a", "w4rq8p9q")],
                    next_page_token: Some(PageToken("1".to_string())),
                })
            });
        repository
            .expect_query_by_partition()
            .withf(|_, token| token.as_ref() == Some(&PageToken("1".to_string())))
            .times(1)
            .returning(|_, _| {
                Ok(LocationPage {
                    items: vec![donor("b", "w4rq8p9r")],
                    next_page_token: None,
                })
            });

        let service = GeohashService::new(Arc::new(repository), &config(3, 50));
        let donors = service
            .query_geohash("BD", BloodGroup::APositive, "w4rq8")
            .await
            .unwrap();
        let ids: Vec<_> = donors.iter().map(|d| d.donor_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_query_error_propagates() {
        let mut repository = MockLocationRepository::new();
        repository.expect_query_by_partition().returning(|_, _| {
            Err(RepositoryError::ConnectionFailed {
                message: "down".to_string(),
            })
        });

        let service = GeohashService::new(Arc::new(repository), &config(3, 50));
        let result = service.query_area("BD", BloodGroup::APositive).await;
        assert!(matches!(result, Err(RepositoryError::ConnectionFailed { .. })));
    }

    #[test]
    fn test_expansion_stops_at_execution_budget() {
        let service = GeohashService::new(Arc::new(MockLocationRepository::new()), &config(5, 20));
        let expansion = service.get_neighbor_geohashes("w4rq8p9", 0, vec!["w4rq8p9".to_string()]);

        // 1 + 8 = 9 < 20, then + 16 = 25
        assert_eq!(expansion.neighbor_level, 2);
        assert_eq!(expansion.geohashes.len(), 25);
        assert_eq!(expansion.geohashes[0], "w4rq8p9");
    }

    #[test]
    fn test_expansion_stops_at_max_level() {
        let service = GeohashService::new(Arc::new(MockLocationRepository::new()), &config(1, 100));
        let expansion = service.get_neighbor_geohashes("w4rq8p9", 0, Vec::new());
        assert_eq!(expansion.neighbor_level, 1);
        assert_eq!(expansion.geohashes.len(), 8);

        let exhausted = service.get_neighbor_geohashes("w4rq8p9", 1, Vec::new());
        assert_eq!(exhausted.neighbor_level, 1);
        assert!(exhausted.geohashes.is_empty());
    }

    #[test]
    fn test_expansion_resumes_from_level() {
        let service = GeohashService::new(Arc::new(MockLocationRepository::new()), &config(4, 10));
        let expansion = service.get_neighbor_geohashes("w4rq8p9", 2, vec!["left".to_string()]);
        assert_eq!(expansion.neighbor_level, 3);
        assert_eq!(expansion.geohashes.len(), 1 + 24);
        assert_eq!(expansion.geohashes[1..], geohash::nth_ring_neighbors("w4rq8p9", 3)[..]);
    }
}
