//! End-to-end donor search scenarios
//!
//! Searches run against the in-memory stores with small batch budgets so that
//! a single search spans several invocations, the way the invoking layer
//! drives it in production.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use donor_search::{
    config::SearchConfig,
    errors::{AppError, RepositoryError},
    models::{
        BloodGroup, DonorLocation, DonorSearchOutcome, DonorSearchRequest, SearchAction,
        SearchProgress,
    },
    repositories::{
        InMemoryLocationRepository, InMemorySearchProgressRepository, SearchProgressRepository,
    },
    services::{BoundedCache, DonorSearchService, GeohashDonorCache},
    utils::{ManualClock, geohash},
};

const SEEKER_GEOHASH: &str = "w4rq8p9q";

fn search_config() -> SearchConfig {
    SearchConfig {
        max_neighbor_search_level: 3,
        neighbor_search_prefix_length: 7,
        cache_prefix_length: 5,
        max_geohashes_per_processing_batch: 5,
        max_geohashes_per_execution: 50,
        early_exit_donor_count: 10,
    }
}

fn donor(id: &str, geohash: &str, blood_group: BloodGroup) -> DonorLocation {
    let center = geohash::decode(geohash).unwrap();
    DonorLocation {
        donor_id: id.to_string(),
        location_id: format!("{id}-home"),
        area: "TH".to_string(),
        latitude: center.latitude,
        longitude: center.longitude,
        geohash: geohash.to_string(),
        blood_group,
        available_for_donation: true,
        last_vaccinated_date: None,
    }
}

fn request(seeker_id: &str, request_id: &str, target: usize) -> DonorSearchRequest {
    DonorSearchRequest {
        seeker_id: seeker_id.to_string(),
        created_at: "2025-01-15T10:00:00Z".to_string(),
        request_id: request_id.to_string(),
        seeker_geohash: SEEKER_GEOHASH.to_string(),
        requested_blood_group: BloodGroup::OPositive,
        area: "TH".to_string(),
        eligible_donors: Vec::new(),
        target_donor_count: target,
    }
}

struct Harness {
    locations: Arc<InMemoryLocationRepository>,
    progress: Arc<InMemorySearchProgressRepository>,
    service: DonorSearchService,
}

async fn harness(donors: Vec<DonorLocation>) -> Harness {
    let locations = Arc::new(InMemoryLocationRepository::from_locations(donors, 3).await);
    let progress = Arc::new(InMemorySearchProgressRepository::new());
    let service =
        DonorSearchService::new(locations.clone(), progress.clone(), search_config()).unwrap();
    Harness {
        locations,
        progress,
        service,
    }
}

fn cache() -> GeohashDonorCache {
    BoundedCache::new(100, 10, 30).unwrap()
}

/// Invoke until the search concludes, feeding each outcome into the next call
async fn run_to_completion(
    service: &DonorSearchService,
    cache: &mut GeohashDonorCache,
    mut request: DonorSearchRequest,
    max_invocations: usize,
) -> (DonorSearchOutcome, usize) {
    for invocation in 1..=max_invocations {
        let outcome = service
            .query_eligible_donors(cache, &request)
            .await
            .unwrap();
        if outcome.action == SearchAction::EnoughDonorsFound {
            return (outcome, invocation);
        }
        request = request.with_eligible_donors(outcome.eligible_donors);
    }
    panic!("search did not conclude within {max_invocations} invocations");
}

#[tokio::test]
async fn test_search_converges_over_several_invocations() {
    // Three donors in the outermost ring, spread over two store partitions
    let ring_three = geohash::nth_ring_neighbors("w4rq8p9", 3);
    let donors = vec![
        donor("ring-a", &format!("{}q", ring_three[0]), BloodGroup::OPositive),
        donor("ring-b", &format!("{}q", ring_three[5]), BloodGroup::OPositive),
        donor("ring-c", &format!("{}q", ring_three[23]), BloodGroup::OPositive),
        donor("wrong-group", &format!("{}q", ring_three[1]), BloodGroup::AbNegative),
    ];
    let h = harness(donors).await;

    let (outcome, invocations) =
        run_to_completion(&h.service, &mut cache(), request("seeker", "req-1", 3), 20).await;

    // 49 cells queued, 5 per invocation, the last donor sits in cell 49
    assert_eq!(invocations, 10);
    let mut ids: Vec<_> = outcome
        .eligible_donors
        .iter()
        .map(|d| d.user_id.clone())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["ring-a", "ring-b", "ring-c"]);
    assert!(outcome.eligible_donors.iter().all(|d| d.distance > 0.0));
}

#[tokio::test]
async fn test_first_invocation_queues_every_ring() {
    let h = harness(Vec::new()).await;
    let search = request("seeker", "req-rings", 1);

    let outcome = h
        .service
        .query_eligible_donors(&mut cache(), &search)
        .await
        .unwrap();
    assert_eq!(outcome.action, SearchAction::RetryDonorSearch);

    let progress = h.progress.get(&search.search_key()).await.unwrap().unwrap();
    assert_eq!(progress.current_neighbor_search_level, 3);
    assert_eq!(progress.seeker_geohash_partition, "w4rq8p9");
    assert_eq!(progress.remaining_geohashes_to_process.len(), 49 - 5);
}

#[tokio::test]
async fn test_donor_beyond_rings_found_by_area_scan() {
    let h = harness(vec![donor("distant", "w4rw0000", BloodGroup::OPositive)]).await;

    let (outcome, invocations) =
        run_to_completion(&h.service, &mut cache(), request("seeker", "req-2", 2), 20).await;

    // ten invocations drain the rings, the eleventh scans the area
    assert_eq!(invocations, 11);
    assert_eq!(outcome.eligible_donors.len(), 1);
    assert_eq!(outcome.eligible_donors[0].user_id, "distant");
    assert_eq!(outcome.eligible_donors[0].distance, 40.46);
}

#[tokio::test]
async fn test_empty_area_concludes_with_no_donors() {
    let h = harness(Vec::new()).await;
    let (outcome, _) =
        run_to_completion(&h.service, &mut cache(), request("seeker", "req-3", 2), 20).await;
    assert_eq!(outcome.action, SearchAction::EnoughDonorsFound);
    assert!(outcome.eligible_donors.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_store_outage_leaves_progress_untouched() {
    let h = harness(vec![donor("distant", "w4rw0000", BloodGroup::OPositive)]).await;
    let search = request("seeker", "req-4", 1);
    h.service
        .query_eligible_donors(&mut cache(), &search)
        .await
        .unwrap();
    let before: SearchProgress = h.progress.get(&search.search_key()).await.unwrap().unwrap();

    // fresh caches so every invocation reaches the store
    h.locations.set_unavailable(true);
    let result = h.service.query_eligible_donors(&mut cache(), &search).await;
    assert!(matches!(
        result,
        Err(AppError::Repository(RepositoryError::ConnectionFailed { .. }))
    ));
    let after = h.progress.get(&search.search_key()).await.unwrap().unwrap();
    assert_eq!(after, before);

    h.locations.set_unavailable(false);
    h.service
        .query_eligible_donors(&mut cache(), &search)
        .await
        .unwrap();
    let resumed = h.progress.get(&search.search_key()).await.unwrap().unwrap();
    assert_eq!(
        resumed.remaining_geohashes_to_process.len(),
        before.remaining_geohashes_to_process.len() - 5
    );
}

#[tokio::test]
async fn test_concurrent_requests_share_cached_groups() {
    let h = harness(vec![donor("near", "w4rq8p9r", BloodGroup::OPositive)]).await;
    let mut cache = cache();

    h.service
        .query_eligible_donors(&mut cache, &request("seeker-a", "req-a", 5))
        .await
        .unwrap();
    let queries = h.locations.query_count();
    assert!(queries > 0);

    let outcome = h
        .service
        .query_eligible_donors(&mut cache, &request("seeker-b", "req-b", 5))
        .await
        .unwrap();
    assert_eq!(h.locations.query_count(), queries);
    assert_eq!(outcome.eligible_donors[0].user_id, "near");
}

#[tokio::test]
async fn test_expired_groups_are_fetched_again() {
    let h = harness(vec![donor("near", "w4rq8p9r", BloodGroup::OPositive)]).await;
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
    ));
    let mut cache = BoundedCache::with_clock(100, 10, 30, clock.clone()).unwrap();

    h.service
        .query_eligible_donors(&mut cache, &request("seeker-a", "req-a", 5))
        .await
        .unwrap();
    let queries = h.locations.query_count();

    clock.advance(Duration::minutes(29));
    h.service
        .query_eligible_donors(&mut cache, &request("seeker-b", "req-b", 5))
        .await
        .unwrap();
    assert_eq!(h.locations.query_count(), queries);

    clock.advance(Duration::minutes(2));
    h.service
        .query_eligible_donors(&mut cache, &request("seeker-c", "req-c", 5))
        .await
        .unwrap();
    assert!(h.locations.query_count() > queries);
}

#[tokio::test]
async fn test_searches_are_isolated_by_request() {
    let h = harness(Vec::new()).await;
    let mut cache = cache();

    h.service
        .query_eligible_donors(&mut cache, &request("seeker", "req-x", 1))
        .await
        .unwrap();
    h.service
        .query_eligible_donors(&mut cache, &request("seeker", "req-y", 1))
        .await
        .unwrap();

    assert_eq!(h.progress.len().await, 2);
    let x = h
        .progress
        .get(&request("seeker", "req-x", 1).search_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(x.remaining_geohashes_to_process.len(), 44);
}
