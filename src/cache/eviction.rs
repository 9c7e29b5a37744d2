//! Eviction Tracker Module
//!
//! Orders cache keys for eviction: lowest priority first, then least
//! recently used.

use std::collections::BTreeMap;

// == Eviction Rank ==
/// Sort key for eviction.
///
/// Ordering is `(priority, last_accessed_ms, sequence)`. The sequence number
/// is unique per touch, so two entries touched in the same millisecond still
/// evict in access order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EvictionRank {
    priority: i32,
    last_accessed_ms: u64,
    sequence: u64,
}

impl EvictionRank {
    /// Creates a rank.
    pub fn new(priority: i32, last_accessed_ms: u64, sequence: u64) -> Self {
        Self {
            priority,
            last_accessed_ms,
            sequence,
        }
    }
}

// == Eviction Tracker ==
/// Keys indexed by eviction rank.
///
/// - First = next to evict
/// - Last = most valuable
#[derive(Debug)]
pub struct EvictionTracker<K> {
    order: BTreeMap<EvictionRank, K>,
}

impl<K> Default for EvictionTracker<K> {
    fn default() -> Self {
        Self {
            order: BTreeMap::new(),
        }
    }
}

impl<K: Clone + PartialEq> EvictionTracker<K> {
    // == Constructor ==
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Tracks `key` at `rank`.
    pub fn insert(&mut self, rank: EvictionRank, key: K) {
        self.order.insert(rank, key);
    }

    // == Remove ==
    /// Stops tracking whatever key sits at `rank`.
    pub fn remove(&mut self, rank: &EvictionRank) -> Option<K> {
        self.order.remove(rank)
    }

    // == Peek Lowest ==
    /// Returns the next eviction candidate without removing it.
    pub fn peek_lowest(&self) -> Option<&K> {
        self.order.values().next()
    }

    /// Collects candidates in eviction order, skipping `protect`, until
    /// `enough` says the collected set suffices.
    ///
    /// Returns `None` if every candidate was taken and `enough` never held.
    pub fn plan<F>(&self, protect: Option<&K>, mut enough: F) -> Option<Vec<K>>
    where
        F: FnMut(&K) -> bool,
    {
        let mut victims = Vec::new();
        for key in self.order.values() {
            if protect == Some(key) {
                continue;
            }
            victims.push(key.clone());
            if enough(key) {
                return Some(victims);
            }
        }
        None
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.order.clear();
    }
}
