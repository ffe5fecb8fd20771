use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod defaults;

use crate::errors::{AppError, AppResult};
use crate::models::donor_location::GEO_PARTITION_PREFIX_LENGTH;
use crate::utils::geohash::MAX_PRECISION;
use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limits of the per-process geohash cache
///
/// Values must be whole numbers; TOML floats are rejected when the file is
/// parsed and non-positive values by [`Config::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: i64,
    #[serde(default = "default_cache_max_size_mb")]
    pub max_size_mb: i64,
    #[serde(default = "default_cache_ttl_minutes")]
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Outermost neighbor ring searched before the area-wide fallback
    #[serde(default = "default_max_neighbor_search_level")]
    pub max_neighbor_search_level: u32,
    /// Geohash length of the cells walked by the ring search
    #[serde(default = "default_neighbor_search_prefix_length")]
    pub neighbor_search_prefix_length: usize,
    /// Geohash length of cache keys, coarser than the search cells
    #[serde(default = "default_cache_prefix_length")]
    pub cache_prefix_length: usize,
    /// Cells processed per invocation
    #[serde(default = "default_max_geohashes_per_processing_batch")]
    pub max_geohashes_per_processing_batch: usize,
    /// Ring expansion stops once this many cells are queued
    #[serde(default = "default_max_geohashes_per_execution")]
    pub max_geohashes_per_execution: usize,
    /// An invocation stops draining once more donors than this are found
    #[serde(default = "default_early_exit_donor_count")]
    pub early_exit_donor_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_json")]
    pub json: bool,
}

fn default_cache_max_entries() -> i64 {
    DEFAULT_CACHE_MAX_ENTRIES
}

fn default_cache_max_size_mb() -> i64 {
    DEFAULT_CACHE_MAX_SIZE_MB
}

fn default_cache_ttl_minutes() -> i64 {
    DEFAULT_CACHE_TTL_MINUTES
}

fn default_max_neighbor_search_level() -> u32 {
    DEFAULT_MAX_NEIGHBOR_SEARCH_LEVEL
}

fn default_neighbor_search_prefix_length() -> usize {
    DEFAULT_NEIGHBOR_SEARCH_PREFIX_LENGTH
}

fn default_cache_prefix_length() -> usize {
    DEFAULT_CACHE_PREFIX_LENGTH
}

fn default_max_geohashes_per_processing_batch() -> usize {
    DEFAULT_MAX_GEOHASHES_PER_PROCESSING_BATCH
}

fn default_max_geohashes_per_execution() -> usize {
    DEFAULT_MAX_GEOHASHES_PER_EXECUTION
}

fn default_early_exit_donor_count() -> usize {
    DEFAULT_EARLY_EXIT_DONOR_COUNT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_json() -> bool {
    DEFAULT_LOG_JSON
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            max_size_mb: default_cache_max_size_mb(),
            ttl_minutes: default_cache_ttl_minutes(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_neighbor_search_level: default_max_neighbor_search_level(),
            neighbor_search_prefix_length: default_neighbor_search_prefix_length(),
            cache_prefix_length: default_cache_prefix_length(),
            max_geohashes_per_processing_batch: default_max_geohashes_per_processing_batch(),
            max_geohashes_per_execution: default_max_geohashes_per_execution(),
            early_exit_donor_count: default_early_exit_donor_count(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_log_json(),
        }
    }
}

impl SearchConfig {
    /// Check prefix lengths and budgets for consistency
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=MAX_PRECISION).contains(&self.neighbor_search_prefix_length) {
            return Err(AppError::configuration(format!(
                "neighbor_search_prefix_length must be between 1 and {MAX_PRECISION}, got {}",
                self.neighbor_search_prefix_length
            )));
        }
        if self.cache_prefix_length < GEO_PARTITION_PREFIX_LENGTH
            || self.cache_prefix_length > self.neighbor_search_prefix_length
        {
            return Err(AppError::configuration(format!(
                "cache_prefix_length must be between {GEO_PARTITION_PREFIX_LENGTH} and neighbor_search_prefix_length ({}), got {}",
                self.neighbor_search_prefix_length, self.cache_prefix_length
            )));
        }
        if self.max_geohashes_per_processing_batch == 0 {
            return Err(AppError::configuration(
                "max_geohashes_per_processing_batch must be positive",
            ));
        }
        if self.max_geohashes_per_execution == 0 {
            return Err(AppError::configuration(
                "max_geohashes_per_execution must be positive",
            ));
        }
        Ok(())
    }
}

impl CacheConfig {
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("max_entries", self.max_entries),
            ("max_size_mb", self.max_size_mb),
            ("ttl_minutes", self.ttl_minutes),
        ] {
            if value <= 0 {
                return Err(AppError::configuration(format!(
                    "cache.{name} must be a positive integer, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let config = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str::<Self>(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.cache.validate()?;
        self.search.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            max_entries = 5

            [search]
            neighbor_search_prefix_length = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.max_entries, 5);
        assert_eq!(config.cache.ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
        assert_eq!(config.search.neighbor_search_prefix_length, 8);
        assert_eq!(
            config.search.max_neighbor_search_level,
            DEFAULT_MAX_NEIGHBOR_SEARCH_LEVEL
        );
    }

    #[test]
    fn test_fractional_cache_size_is_rejected() {
        let result = toml::from_str::<Config>("[cache]\nmax_size_mb = 1.5\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.cache.ttl_minutes = 0;
        assert!(matches!(config.validate(), Err(AppError::Configuration { .. })));

        let mut config = Config::default();
        config.search.cache_prefix_length = 8;
        config.search.neighbor_search_prefix_length = 7;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.cache_prefix_length = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.max_geohashes_per_processing_batch = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let created = Config::load_from_file(path).unwrap();
        assert!(std::path::Path::new(path).exists());
        assert_eq!(created.cache.max_entries, DEFAULT_CACHE_MAX_ENTRIES);

        let reloaded = Config::load_from_file(path).unwrap();
        assert_eq!(reloaded.search.cache_prefix_length, DEFAULT_CACHE_PREFIX_LENGTH);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[search]\nmax_geohashes_per_execution = 0").unwrap();
        assert!(Config::load_from_file(file.path().to_str().unwrap()).is_err());
    }
}
