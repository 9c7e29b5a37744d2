//! Cache Store Module
//!
//! Main cache engine: HashMap storage, an eviction index ordered by priority
//! then recency, TTL expiry and a dual item/byte budget.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::time::Instant;

use tracing::{debug, warn};

use crate::cache::{
    AccessWindow, CacheConfig, CacheEntry, CacheStats, EvictionRank, EvictionTracker, SetOptions,
    SizeEstimate, ACCESS_WINDOW,
};
use crate::clock::{duration_ms, SharedClock, SystemClock};
use crate::error::{ReasonCode, Result, VerificationResult};

// == Removal Cause ==
/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// Removed by `delete`
    Deleted,
    /// Evicted to satisfy the item or byte budget
    Evicted,
    /// TTL elapsed
    Expired,
    /// Removed by `invalidate_version`
    Invalidated,
    /// Removed by `clear`
    Cleared,
}

/// Callback run for every entry that leaves the cache, except overwrites.
pub type RemovalListener<K, V> = Box<dyn Fn(&K, &V, RemovalCause) + Send + Sync>;

// == Bounded Cache ==
/// Cache bounded by both entry count and total estimated bytes.
///
/// The cache never holds more than `max_items` entries or more than
/// `max_size_bytes` bytes; a `set` that cannot fit is refused.
pub struct BoundedCache<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// Eviction order
    order: EvictionTracker<K>,
    /// Keys with a TTL, ordered by `(expires_at_ms, sequence)`
    expiries: BTreeMap<(u64, u64), K>,
    /// Performance statistics
    stats: CacheStats,
    /// Recent `get` latencies
    access_times: AccessWindow,
    /// Sum of `size_bytes` over live entries
    current_size_bytes: u64,
    /// Monotonic touch counter for eviction tie-breaks
    sequence: u64,
    on_removal: Option<RemovalListener<K, V>>,
    config: CacheConfig,
    clock: SharedClock,
}

impl<K, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("items", &self.entries.len())
            .field("current_size_bytes", &self.current_size_bytes)
            .field("config", &self.config)
            .field("has_removal_listener", &self.on_removal.is_some())
            .finish()
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + SizeEstimate,
{
    // == Constructor ==
    /// Creates a cache, failing fast on unusable configuration.
    pub fn new(config: CacheConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            entries: HashMap::new(),
            order: EvictionTracker::new(),
            expiries: BTreeMap::new(),
            stats: CacheStats::new(),
            access_times: AccessWindow::new(ACCESS_WINDOW),
            current_size_bytes: 0,
            sequence: 0,
            on_removal: None,
            config,
            clock,
        })
    }

    /// Creates a cache with default configuration on the system clock.
    pub fn with_defaults() -> Result<Self> {
        Self::new(CacheConfig::default(), SystemClock::shared())
    }

    /// Registers a callback for entries leaving the cache.
    pub fn set_removal_listener<F>(&mut self, listener: F)
    where
        F: Fn(&K, &V, RemovalCause) + Send + Sync + 'static,
    {
        self.on_removal = Some(Box::new(listener));
    }

    fn next_rank(&mut self, priority: i32, now_ms: u64) -> EvictionRank {
        self.sequence += 1;
        EvictionRank::new(priority, now_ms, self.sequence)
    }

    // == Set ==
    /// Stores `value` under `key`.
    ///
    /// The size comes from `options.size` or the value's estimate. When the
    /// entry would break a bound, expired entries are pruned first, then live
    /// entries are evicted lowest-priority-first, least-recently-used next.
    /// The key being written is never evicted to make room for itself.
    ///
    /// Returns false, leaving the cache untouched, if the entry cannot fit.
    pub fn set(&mut self, key: K, value: V, options: SetOptions) -> bool {
        self.try_set(key, value, options).valid
    }

    /// Like [`Self::set`], but a refused entry comes back as a
    /// `CACHE_OVER_BUDGET` rejection explaining the shortfall.
    pub fn try_set(&mut self, key: K, value: V, options: SetOptions) -> VerificationResult {
        let size = options.size.unwrap_or_else(|| value.estimated_size());
        if size > self.config.max_size_bytes {
            warn!(
                "Refusing cache entry of {} bytes (budget {} bytes)",
                size, self.config.max_size_bytes
            );
            self.stats.record_rejected_set();
            return VerificationResult::rejected(
                ReasonCode::CacheOverBudget,
                format!(
                    "entry of {} bytes exceeds the {} byte budget",
                    size, self.config.max_size_bytes
                ),
            );
        }

        let (mut bytes_needed, mut slots_needed) = self.shortfall(&key, size);
        if bytes_needed > 0 || slots_needed > 0 {
            self.prune();
            (bytes_needed, slots_needed) = self.shortfall(&key, size);
        }
        if (bytes_needed > 0 || slots_needed > 0)
            && !self.make_room(bytes_needed, slots_needed, Some(&key))
        {
            warn!("Cache entry refused: could not free {} bytes", bytes_needed);
            self.stats.record_rejected_set();
            return VerificationResult::rejected(
                ReasonCode::CacheOverBudget,
                format!(
                    "could not free {} bytes and {} slots",
                    bytes_needed, slots_needed
                ),
            );
        }

        if let Some(previous) = self.entries.remove(&key) {
            self.unindex(&previous);
        }

        let now = self.clock.now_ms();
        let ttl = options.ttl.or(self.config.default_ttl);
        let rank = self.next_rank(options.priority, now);
        let expires_at_ms = ttl.map(|ttl| now.saturating_add(duration_ms(ttl)));
        let expiry_slot = expires_at_ms.map(|at| (at, self.sequence));
        let entry = CacheEntry {
            value,
            size_bytes: size,
            created_at_ms: now,
            last_accessed_ms: now,
            expires_at_ms,
            version: options.version,
            priority: options.priority,
            access_count: 0,
            rank,
            expiry_slot,
        };

        self.order.insert(rank, key.clone());
        if let Some(slot) = expiry_slot {
            self.expiries.insert(slot, key.clone());
        }
        self.current_size_bytes += size;
        self.entries.insert(key, entry);
        VerificationResult::accepted()
    }

    /// Drops `entry` from the eviction and expiry indexes and the byte count.
    fn unindex(&mut self, entry: &CacheEntry<V>) {
        self.order.remove(&entry.rank);
        if let Some(slot) = &entry.expiry_slot {
            self.expiries.remove(slot);
        }
        self.current_size_bytes -= entry.size_bytes;
    }

    /// Bytes and slots that must be freed before `key` can hold `size` bytes.
    fn shortfall(&self, key: &K, size: u64) -> (u64, usize) {
        let replaced = self.entries.get(key).map(|entry| entry.size_bytes);
        let projected = self.current_size_bytes - replaced.unwrap_or(0) + size;
        let bytes_needed = projected.saturating_sub(self.config.max_size_bytes);
        let slots_needed = match replaced {
            Some(_) => 0,
            None => (self.entries.len() + 1).saturating_sub(self.config.max_items),
        };
        (bytes_needed, slots_needed)
    }

    /// Evicts until `bytes_needed` bytes and `slots_needed` slots are free.
    ///
    /// Victims are chosen before anything is removed, so a request that
    /// cannot be satisfied evicts nothing.
    fn make_room(&mut self, bytes_needed: u64, slots_needed: usize, protect: Option<&K>) -> bool {
        let entries = &self.entries;
        let mut freed_bytes = 0u64;
        let mut freed_slots = 0usize;
        let plan = self.order.plan(protect, |key| {
            freed_bytes += entries.get(key).map_or(0, |entry| entry.size_bytes);
            freed_slots += 1;
            freed_bytes >= bytes_needed && freed_slots >= slots_needed
        });

        let Some(victims) = plan else {
            return false;
        };

        for key in &victims {
            self.remove_entry(key, RemovalCause::Evicted);
            self.stats.record_eviction();
        }
        debug!("Evicted {} cache entries, freeing {} bytes", victims.len(), freed_bytes);
        true
    }

    // == Evict Entries ==
    /// Evicts entries in eviction order until at least `bytes_needed` bytes
    /// are freed or the cache is empty. Returns the number evicted.
    pub fn evict_entries(&mut self, bytes_needed: u64) -> usize {
        let mut freed = 0u64;
        let mut evicted = 0;
        while freed < bytes_needed {
            let Some(key) = self.order.peek_lowest().cloned() else {
                break;
            };
            if let Some(entry) = self.remove_entry(&key, RemovalCause::Evicted) {
                freed += entry.size_bytes;
            }
            self.stats.record_eviction();
            evicted += 1;
        }
        evicted
    }

    // == Get ==
    /// Retrieves a clone of the value stored under `key`.
    ///
    /// Expired entries are removed and counted as misses. Hits refresh the
    /// entry's recency.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let started = Instant::now();
        let now = self.clock.now_ms();

        let value = if self.live(key, now) {
            self.touch(key, now);
            self.entries.get(key).map(|entry| entry.value.clone())
        } else {
            None
        };

        match value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        self.access_times.record(started.elapsed());
        value
    }

    // == Has ==
    /// Returns true if a live entry exists under `key`.
    ///
    /// Expires like [`Self::get`] and refreshes recency, but records no hit,
    /// miss or latency.
    pub fn has(&mut self, key: &K) -> bool {
        let now = self.clock.now_ms();
        if self.live(key, now) {
            self.touch(key, now);
            true
        } else {
            false
        }
    }

    /// Returns true if `key` holds an unexpired entry, removing it if expired.
    fn live(&mut self, key: &K, now: u64) -> bool {
        match self.entries.get(key) {
            None => false,
            Some(entry) if entry.is_expired_at(now) => {
                self.remove_entry(key, RemovalCause::Expired);
                self.stats.record_pruned(1);
                false
            }
            Some(_) => true,
        }
    }

    fn touch(&mut self, key: &K, now: u64) {
        self.sequence += 1;
        let sequence = self.sequence;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.rank);
            entry.rank = EvictionRank::new(entry.priority, now, sequence);
            entry.last_accessed_ms = now;
            entry.access_count += 1;
            self.order.insert(entry.rank, key.clone());
        }
    }

    /// Returns the entry under `key` without touching it or the statistics.
    pub fn peek_entry(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    // == Delete ==
    /// Removes the entry under `key`. Returns true if one was removed.
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove_entry(key, RemovalCause::Deleted).is_some()
    }

    fn remove_entry(&mut self, key: &K, cause: RemovalCause) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.unindex(&entry);
        if let Some(listener) = &self.on_removal {
            listener(key, &entry.value, cause);
        }
        Some(entry)
    }

    // == Get Or Insert ==
    /// Returns the cached value, computing and storing it on a miss.
    ///
    /// The computed value is returned even if it could not be stored.
    pub fn get_or_insert_with<F>(&mut self, key: K, options: SetOptions, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.set(key, value.clone(), options);
        value
    }

    // == Prune ==
    /// Removes every expired entry. Returns the number removed.
    ///
    /// Walks the expiry index, so only expired keys are visited.
    pub fn prune(&mut self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<K> = self
            .expiries
            .range(..=(now, u64::MAX))
            .map(|(_, key)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key, RemovalCause::Expired);
        }

        self.stats.record_pruned(expired.len());
        expired.len()
    }

    // == Invalidate Version ==
    /// Removes every entry tagged with `version`. Returns the number removed.
    pub fn invalidate_version(&mut self, version: &str) -> usize {
        let tagged: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.version.as_deref() == Some(version))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &tagged {
            self.remove_entry(key, RemovalCause::Invalidated);
        }

        if !tagged.is_empty() {
            debug!("Invalidated {} cache entries for version '{}'", tagged.len(), version);
        }
        tagged.len()
    }

    // == Clear ==
    /// Removes every entry. Statistics are kept.
    pub fn clear(&mut self) {
        let keys: Vec<K> = self.entries.keys().cloned().collect();
        for key in &keys {
            self.remove_entry(key, RemovalCause::Cleared);
        }
        self.order.clear();
        self.expiries.clear();
        self.current_size_bytes = 0;
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.item_count = self.entries.len();
        stats.size_bytes = self.current_size_bytes;
        stats.max_items = self.config.max_items;
        stats.max_size_bytes = self.config.max_size_bytes;
        stats.hit_rate = stats.compute_hit_rate();
        stats.avg_access_time_us = self.access_times.average_us();
        stats
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the tracked total size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.current_size_bytes
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Sum of entry sizes, recomputed from scratch.
    #[cfg(test)]
    pub(crate) fn recomputed_size(&self) -> u64 {
        self.entries.values().map(|entry| entry.size_bytes).sum()
    }

    /// True if the expiry index holds exactly the entries that carry a TTL.
    #[cfg(test)]
    pub(crate) fn expiry_index_consistent(&self) -> bool {
        let with_ttl = self
            .entries
            .values()
            .filter(|entry| entry.expires_at_ms.is_some())
            .count();
        with_ttl == self.expiries.len()
            && self.expiries.iter().all(|((at, _), key)| {
                self.entries
                    .get(key)
                    .is_some_and(|entry| entry.expires_at_ms == Some(*at))
            })
    }
}
