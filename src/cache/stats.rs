//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and
//! access latency.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

// == Cache Stats ==
/// Cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries evicted to satisfy a bound
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed
    pub pruned: u64,
    /// Number of `set` calls refused for lack of budget
    pub rejected_sets: u64,
    /// Current number of entries in the cache
    pub item_count: usize,
    /// Current tracked size in bytes
    pub size_bytes: u64,
    /// Configured item limit
    pub max_items: usize,
    /// Configured byte budget
    pub max_size_bytes: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// Mean `get` latency over the recent access window, in microseconds
    pub avg_access_time_us: f64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn compute_hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Increments the eviction counter.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Adds expired removals.
    pub fn record_pruned(&mut self, count: usize) {
        self.pruned += count as u64;
    }

    /// Increments the refused-set counter.
    pub fn record_rejected_set(&mut self) {
        self.rejected_sets += 1;
    }
}

// == Access Window ==
/// Rolling window of the most recent access latencies.
#[derive(Debug, Clone)]
pub struct AccessWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl AccessWindow {
    /// Creates a window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a sample, dropping the oldest once full.
    pub fn record(&mut self, elapsed: Duration) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);
    }

    /// Mean of the samples in microseconds, 0.0 when empty.
    pub fn average_us(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.samples.iter().sum();
        total.as_secs_f64() * 1_000_000.0 / self.samples.len() as f64
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples are held.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
