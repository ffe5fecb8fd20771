/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Geohash cache defaults
pub const DEFAULT_CACHE_MAX_ENTRIES: i64 = 100;
pub const DEFAULT_CACHE_MAX_SIZE_MB: i64 = 10;
pub const DEFAULT_CACHE_TTL_MINUTES: i64 = 30;

// Neighbor search defaults
pub const DEFAULT_MAX_NEIGHBOR_SEARCH_LEVEL: u32 = 3;
pub const DEFAULT_NEIGHBOR_SEARCH_PREFIX_LENGTH: usize = 7;
pub const DEFAULT_CACHE_PREFIX_LENGTH: usize = 4;
pub const DEFAULT_MAX_GEOHASHES_PER_PROCESSING_BATCH: usize = 10;
pub const DEFAULT_MAX_GEOHASHES_PER_EXECUTION: usize = 50;
pub const DEFAULT_EARLY_EXIT_DONOR_COUNT: usize = 10;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_JSON: bool = false;

// Config file
pub const DEFAULT_CONFIG_FILE: &str = "donor-search.toml";
pub const CONFIG_FILE_ENV: &str = "DONOR_SEARCH_CONFIG_FILE";
