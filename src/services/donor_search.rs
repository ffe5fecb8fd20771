//! Resumable donor search
//!
//! Each call to [`DonorSearchService::query_eligible_donors`] does a bounded
//! amount of work: it resumes from the persisted [`SearchProgress`], queues
//! further neighbor rings when the queue runs low, drains at most one batch
//! of cells and persists what is left before returning a decision. Once
//! every ring up to the maximum level has been drained, the next call scans
//! the whole area instead and always concludes the search.
//!
//! Nothing is persisted when a store call fails, so a retry resumes from the
//! last successful invocation. Reprocessing a cell is harmless because the
//! accumulator keeps one entry per donor.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::geohash_cache::BoundedCache;
use super::geohash_grouper::{GeohashGroup, group_by_prefix};
use super::geohash_service::GeohashService;
use crate::config::SearchConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    DonorReference, DonorSearchOutcome, DonorSearchRequest, EligibleDonor, SearchAction,
    SearchKey, SearchProgress, SearchState,
};
use crate::repositories::{LocationRepository, SearchProgressRepository};
use crate::utils::geohash;

/// Cache of grouped donors keyed by `{area}-{blood group}-{cache prefix}`
pub type GeohashDonorCache = BoundedCache<String, GeohashGroup>;

/// Eligible donors keyed by donor id, in first-encounter order
///
/// A donor already present is only updated when a strictly smaller
/// distance is offered, so the nearest known location wins.
#[derive(Debug, Default)]
pub struct EligibleDonorAccumulator {
    positions: HashMap<String, usize>,
    donors: Vec<EligibleDonor>,
}

impl EligibleDonorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from donors found by earlier invocations
    pub fn from_donors<'a>(donors: impl IntoIterator<Item = &'a EligibleDonor>) -> Self {
        let mut accumulator = Self::new();
        for donor in donors {
            accumulator.offer(&donor.user_id, &donor.location_id, donor.distance);
        }
        accumulator
    }

    /// Record a donor location; returns true when it was inserted or improved
    pub fn offer(&mut self, user_id: &str, location_id: &str, distance: f64) -> bool {
        match self.positions.get(user_id) {
            Some(&position) => {
                let known = &mut self.donors[position];
                if distance < known.distance {
                    known.location_id = location_id.to_string();
                    known.distance = distance;
                    true
                } else {
                    false
                }
            }
            None => {
                self.positions
                    .insert(user_id.to_string(), self.donors.len());
                self.donors.push(EligibleDonor {
                    user_id: user_id.to_string(),
                    location_id: location_id.to_string(),
                    distance,
                });
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.donors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.donors.is_empty()
    }

    pub fn into_vec(self) -> Vec<EligibleDonor> {
        self.donors
    }

    /// The `count` nearest donors, ascending; ties keep encounter order
    pub fn closest(mut self, count: usize) -> Vec<EligibleDonor> {
        self.donors
            .sort_by(|a, b| a.distance.total_cmp(&b.distance));
        self.donors.truncate(count);
        self.donors
    }
}

pub struct DonorSearchService {
    geohash_service: GeohashService,
    progress_repository: Arc<dyn SearchProgressRepository>,
    config: SearchConfig,
}

impl DonorSearchService {
    pub fn new(
        location_repository: Arc<dyn LocationRepository>,
        progress_repository: Arc<dyn SearchProgressRepository>,
        config: SearchConfig,
    ) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            geohash_service: GeohashService::new(location_repository, &config),
            progress_repository,
            config,
        })
    }

    /// Run one bounded step of a donor search
    ///
    /// # Returns
    ///
    /// * `EnoughDonorsFound` - the target was reached, or the area-wide
    ///   fallback ran (possibly with fewer donors than requested)
    /// * `RetryDonorSearch` - more cells remain; invoke again with the
    ///   returned donors
    #[instrument(
        skip_all,
        fields(
            seeker_id = %request.seeker_id,
            request_id = %request.request_id,
            blood_group = %request.requested_blood_group,
        )
    )]
    pub async fn query_eligible_donors(
        &self,
        cache: &mut GeohashDonorCache,
        request: &DonorSearchRequest,
    ) -> AppResult<DonorSearchOutcome> {
        let seeker_partition = self.seeker_partition(&request.seeker_geohash)?;
        let key = request.search_key();

        let stored = self.progress_repository.get(&key).await?;
        let initial_state = match &stored {
            None => SearchState::Initiated,
            Some(progress) => progress.state(self.config.max_neighbor_search_level),
        };
        let mut progress = stored.unwrap_or_else(|| SearchProgress::initial(seeker_partition));

        let mut donors = EligibleDonorAccumulator::from_donors(
            request
                .eligible_donors
                .iter()
                .filter(|donor| donor.user_id != request.seeker_id),
        );

        debug!(
            state = %initial_state,
            level = progress.current_neighbor_search_level,
            remaining = progress.remaining_geohashes_to_process.len(),
            donors_so_far = donors.len(),
            "resuming donor search"
        );

        self.queue_neighbor_rings(&mut progress);

        if progress.state(self.config.max_neighbor_search_level) == SearchState::Exhausted {
            return self
                .scan_whole_area(request, &key, &progress, donors)
                .await;
        }

        let mut queue = VecDeque::from(std::mem::take(
            &mut progress.remaining_geohashes_to_process,
        ));
        let mut processed = 0usize;

        while processed < self.config.max_geohashes_per_processing_batch
            && donors.len() < request.target_donor_count
            && donors.len() <= self.config.early_exit_donor_count
        {
            let Some(cell) = queue.pop_front() else {
                break;
            };
            self.process_geohash(cache, request, &cell, &mut donors)
                .await?;
            processed += 1;
        }

        progress.remaining_geohashes_to_process = queue.into();
        self.progress_repository.put(&key, &progress).await?;

        let action = if donors.len() >= request.target_donor_count {
            SearchAction::EnoughDonorsFound
        } else {
            SearchAction::RetryDonorSearch
        };

        info!(
            %action,
            processed,
            level = progress.current_neighbor_search_level,
            remaining = progress.remaining_geohashes_to_process.len(),
            donors = donors.len(),
            target = request.target_donor_count,
            "donor search step completed"
        );

        Ok(DonorSearchOutcome {
            action,
            eligible_donors: donors.into_vec(),
        })
    }

    fn seeker_partition(&self, seeker_geohash: &str) -> AppResult<String> {
        let length = self.config.neighbor_search_prefix_length;
        if geohash::decode(seeker_geohash).is_none() || seeker_geohash.len() < length {
            return Err(AppError::validation(format!(
                "seeker geohash '{seeker_geohash}' must be a valid geohash of at least {length} characters"
            )));
        }
        Ok(geohash::truncate(seeker_geohash, length).to_string())
    }

    /// Top the queue up with further rings while it is below the execution budget
    fn queue_neighbor_rings(&self, progress: &mut SearchProgress) {
        if progress.remaining_geohashes_to_process.len() >= self.config.max_geohashes_per_execution
            || progress.current_neighbor_search_level >= self.config.max_neighbor_search_level
        {
            return;
        }

        let expansion = self.geohash_service.get_neighbor_geohashes(
            &progress.seeker_geohash_partition,
            progress.current_neighbor_search_level,
            std::mem::take(&mut progress.remaining_geohashes_to_process),
        );
        debug!(
            from_level = progress.current_neighbor_search_level,
            to_level = expansion.neighbor_level,
            queued = expansion.geohashes.len(),
            "queued neighbor rings"
        );
        progress.current_neighbor_search_level = expansion.neighbor_level;
        progress.remaining_geohashes_to_process = expansion.geohashes;
    }

    /// Fold the donors of one cell into the accumulator, via the cache
    async fn process_geohash(
        &self,
        cache: &mut GeohashDonorCache,
        request: &DonorSearchRequest,
        cell: &str,
        donors: &mut EligibleDonorAccumulator,
    ) -> AppResult<()> {
        let cache_prefix = geohash::truncate(cell, self.config.cache_prefix_length);
        let cache_key = format!(
            "{}-{}-{}",
            request.area, request.requested_blood_group, cache_prefix
        );

        let cached: Option<Vec<DonorReference>> = cache
            .get(&cache_key)
            .map(|group| group.donors_at(cell).to_vec());
        let references = match cached {
            Some(references) => references,
            None => {
                let locations = self
                    .geohash_service
                    .query_geohash(&request.area, request.requested_blood_group, cache_prefix)
                    .await?;
                let group = group_by_prefix(&locations, self.config.neighbor_search_prefix_length);
                let references = group.donors_at(cell).to_vec();
                debug!(
                    %cache_key,
                    locations = locations.len(),
                    "cache miss, grouped donors cached"
                );
                cache.set(cache_key, group)?;
                references
            }
        };

        let Some(distance) = geohash::distance_km(&request.seeker_geohash, cell) else {
            warn!(cell, "skipping undecodable cell");
            return Ok(());
        };

        for reference in references
            .iter()
            .filter(|reference| reference.user_id != request.seeker_id)
        {
            donors.offer(&reference.user_id, &reference.location_id, distance);
        }

        Ok(())
    }

    /// Area-wide fallback once the ring search is exhausted
    async fn scan_whole_area(
        &self,
        request: &DonorSearchRequest,
        key: &SearchKey,
        progress: &SearchProgress,
        mut donors: EligibleDonorAccumulator,
    ) -> AppResult<DonorSearchOutcome> {
        let locations = self
            .geohash_service
            .query_area(&request.area, request.requested_blood_group)
            .await?;

        for location in locations
            .iter()
            .filter(|location| location.donor_id != request.seeker_id)
        {
            match geohash::distance_km(&request.seeker_geohash, &location.geohash) {
                Some(distance) => {
                    donors.offer(&location.donor_id, &location.location_id, distance);
                }
                None => warn!(
                    donor_id = %location.donor_id,
                    geohash = %location.geohash,
                    "skipping location with undecodable geohash"
                ),
            }
        }

        self.progress_repository.put(key, progress).await?;

        let eligible_donors = donors.closest(request.target_donor_count);
        info!(
            scanned = locations.len(),
            selected = eligible_donors.len(),
            target = request.target_donor_count,
            "neighbor search exhausted, area-wide scan completed"
        );

        Ok(DonorSearchOutcome {
            action: SearchAction::EnoughDonorsFound,
            eligible_donors,
        })
    }
}
