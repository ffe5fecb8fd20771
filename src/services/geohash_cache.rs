//! Bounded in-memory cache for grouped donor locations
//!
//! Three independent limits apply: entry count, cumulative serialized size
//! and per-entry age. Eviction is FIFO by insertion time, not LRU, and
//! expiry is lazy: a stale entry is dropped when a lookup finds it.
//!
//! The cache is purely an optimisation. Every caller must fall back to the
//! location store on a miss, so an instance is owned by one process and
//! never shared between hosts.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::errors::{CacheError, CacheResult};
use crate::utils::clock::{Clock, SystemClock};

const BYTES_PER_MB: usize = 1024 * 1024;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    size_bytes: usize,
}

/// Snapshot of cache bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub max_entries: usize,
    pub max_size_bytes: usize,
}

/// FIFO cache bounded by entry count, byte size and age
pub struct BoundedCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Keys in insertion order, oldest first
    insertion_order: VecDeque<K>,
    max_entries: usize,
    max_size_bytes: usize,
    ttl: Duration,
    current_size_bytes: usize,
    clock: Arc<dyn Clock>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Serialize,
{
    /// Create a cache using the system clock
    ///
    /// Every parameter must be a positive integer. Values arrive as `i64` so
    /// that zero and negative configuration values are rejected here rather
    /// than wrapping.
    pub fn new(max_entries: i64, max_size_mb: i64, ttl_minutes: i64) -> CacheResult<Self> {
        Self::with_clock(max_entries, max_size_mb, ttl_minutes, Arc::new(SystemClock))
    }

    pub fn with_clock(
        max_entries: i64,
        max_size_mb: i64,
        ttl_minutes: i64,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        let max_entries = positive(max_entries, "max_entries")?;
        let max_size_mb = positive(max_size_mb, "max_size_mb")?;
        let ttl_minutes = positive(ttl_minutes, "ttl_minutes")?;
        Ok(Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            max_entries,
            max_size_bytes: max_size_mb.saturating_mul(BYTES_PER_MB),
            ttl: Duration::minutes(ttl_minutes as i64),
            current_size_bytes: 0,
            clock,
        })
    }

    /// Serialized size of a value, the unit of the byte budget
    pub fn measure(value: &V) -> CacheResult<usize> {
        Ok(serde_json::to_vec(value)?.len())
    }

    /// Insert a value, evicting the oldest entries until it fits
    ///
    /// Overwriting a key replaces the old entry: its size is released and
    /// the key moves to the back of the eviction queue. A value larger than
    /// the whole byte budget is not stored.
    pub fn set(&mut self, key: K, value: V) -> CacheResult<()> {
        let size_bytes = Self::measure(&value)?;

        if self.remove(&key).is_some() {
            trace!(?key, "replacing cached entry");
        }

        if size_bytes > self.max_size_bytes {
            debug!(
                ?key,
                size_bytes,
                max_size_bytes = self.max_size_bytes,
                "value exceeds cache size budget, not cached"
            );
            return Ok(());
        }

        while (self.entries.len() >= self.max_entries
            || self.current_size_bytes + size_bytes > self.max_size_bytes)
            && !self.entries.is_empty()
        {
            self.evict_oldest();
        }

        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: self.clock.now(),
                size_bytes,
            },
        );
        self.insertion_order.push_back(key);
        self.current_size_bytes += size_bytes;

        Ok(())
    }

    /// Look up a value, dropping it if older than the TTL
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let inserted_at = self.entries.get(key)?.inserted_at;

        if self.clock.now() - inserted_at > self.ttl {
            trace!(?key, "cached entry expired");
            self.remove(key);
            return None;
        }

        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked serialized size of all entries, in bytes
    pub fn size_bytes(&self) -> usize {
        self.current_size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            size_bytes: self.current_size_bytes,
            max_entries: self.max_entries,
            max_size_bytes: self.max_size_bytes,
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.insertion_order.pop_front()
            && let Some(entry) = self.entries.remove(&oldest)
        {
            self.current_size_bytes -= entry.size_bytes;
            trace!(key = ?oldest, size_bytes = entry.size_bytes, "evicted oldest cache entry");
        }
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.current_size_bytes -= entry.size_bytes;
        self.insertion_order.retain(|queued| queued != key);
        Some(entry)
    }
}

fn positive(value: i64, parameter: &str) -> CacheResult<usize> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| CacheError::invalid_parameter(parameter, value))
}
