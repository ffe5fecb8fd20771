//! Donor search request, outcome and persisted progress

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::donor_location::BloodGroup;

const DONOR_SEARCH_KEY_PREFIX: &str = "DONOR_SEARCH";

/// Identity of one donor search in the progress store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchKey {
    pub seeker_id: String,
    /// Creation time of the blood request, as issued by the request service
    pub created_at: String,
    pub request_id: String,
}

impl SearchKey {
    pub fn new(
        seeker_id: impl Into<String>,
        created_at: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            seeker_id: seeker_id.into(),
            created_at: created_at.into(),
            request_id: request_id.into(),
        }
    }

    pub fn partition_key(&self) -> String {
        format!("{DONOR_SEARCH_KEY_PREFIX}#{}", self.seeker_id)
    }

    pub fn sort_key(&self) -> String {
        format!(
            "{DONOR_SEARCH_KEY_PREFIX}#{}#{}",
            self.created_at, self.request_id
        )
    }
}

/// Checkpoint of an expanding-ring search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Highest neighbor ring already queued for processing
    pub current_neighbor_search_level: u32,
    /// Cells still to process, drained front to back
    pub remaining_geohashes_to_process: Vec<String>,
    /// The seeker's geohash at neighbor-search precision
    pub seeker_geohash_partition: String,
}

impl SearchProgress {
    /// Progress of a search that has not run yet: only the seeker's own cell
    pub fn initial(seeker_geohash_partition: impl Into<String>) -> Self {
        let partition = seeker_geohash_partition.into();
        Self {
            current_neighbor_search_level: 0,
            remaining_geohashes_to_process: vec![partition.clone()],
            seeker_geohash_partition: partition,
        }
    }

    pub fn state(&self, max_neighbor_search_level: u32) -> SearchState {
        if self.current_neighbor_search_level < max_neighbor_search_level
            || !self.remaining_geohashes_to_process.is_empty()
        {
            SearchState::Expanding
        } else {
            SearchState::Exhausted
        }
    }
}

/// Where a search stands at the start of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchState {
    /// No progress persisted yet
    Initiated,
    /// Rings left to queue or cells left to drain
    Expanding,
    /// Every ring up to the maximum level has been processed
    Exhausted,
}

/// Decision returned to the invoking layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchAction {
    EnoughDonorsFound,
    RetryDonorSearch,
}

/// A donor matched by the search with its best known distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibleDonor {
    pub user_id: String,
    pub location_id: String,
    /// Kilometres from the seeker, two decimals
    pub distance: f64,
}

/// Input of one search invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorSearchRequest {
    pub seeker_id: String,
    pub created_at: String,
    pub request_id: String,
    pub seeker_geohash: String,
    pub requested_blood_group: BloodGroup,
    pub area: String,
    #[serde(default)]
    pub eligible_donors: Vec<EligibleDonor>,
    pub target_donor_count: usize,
}

impl DonorSearchRequest {
    pub fn search_key(&self) -> SearchKey {
        SearchKey::new(&self.seeker_id, &self.created_at, &self.request_id)
    }

    /// Continue the search with the donors accumulated by a previous invocation
    pub fn with_eligible_donors(mut self, eligible_donors: Vec<EligibleDonor>) -> Self {
        self.eligible_donors = eligible_donors;
        self
    }
}

/// Output of one search invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorSearchOutcome {
    pub action: SearchAction,
    pub eligible_donors: Vec<EligibleDonor>,
}
