//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the dual bound, eviction order and statistics over
//! arbitrary operation sequences.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{BoundedCache, CacheConfig, SetOptions};
use crate::clock::ManualClock;

// == Test Configuration ==
const START_MS: u64 = 1_700_000_000_000;
const TEST_MAX_ITEMS: usize = 8;
const TEST_MAX_BYTES: u64 = 400;

fn cache() -> (BoundedCache<String, String>, Arc<ManualClock>) {
    let config = CacheConfig::default()
        .with_max_items(TEST_MAX_ITEMS)
        .with_max_size_bytes(TEST_MAX_BYTES);
    let clock = ManualClock::new(START_MS);
    let cache = BoundedCache::new(config, clock.clone()).unwrap();
    (cache, clock)
}

// == Strategies ==
/// Generates keys from a small pool so operations collide
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-l]".prop_map(|s| s)
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Set {
        key: String,
        size: u64,
        priority: i32,
        ttl_secs: Option<u64>,
    },
    Get {
        key: String,
    },
    Delete {
        key: String,
    },
    Advance {
        secs: u64,
    },
    Prune,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (key_strategy(), 1u64..500, 0i32..3, prop::option::of(1u64..30)).prop_map(
            |(key, size, priority, ttl_secs)| CacheOp::Set { key, size, priority, ttl_secs }
        ),
        3 => key_strategy().prop_map(|key| CacheOp::Get { key }),
        1 => key_strategy().prop_map(|key| CacheOp::Delete { key }),
        1 => (1u64..20).prop_map(|secs| CacheOp::Advance { secs }),
        1 => Just(CacheOp::Prune),
    ]
}

fn apply(
    cache: &mut BoundedCache<String, String>,
    clock: &ManualClock,
    op: CacheOp,
) -> Option<bool> {
    match op {
        CacheOp::Set { key, size, priority, ttl_secs } => {
            let mut options = SetOptions::new().size(size).priority(priority);
            if let Some(secs) = ttl_secs {
                options = options.ttl(Duration::from_secs(secs));
            }
            Some(cache.set(key, "v".to_string(), options))
        }
        CacheOp::Get { key } => Some(cache.get(&key).is_some()),
        CacheOp::Delete { key } => {
            cache.delete(&key);
            None
        }
        CacheOp::Advance { secs } => {
            clock.advance(Duration::from_secs(secs));
            None
        }
        CacheOp::Prune => {
            cache.prune();
            None
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // *For any* sequence of operations, the cache never holds more than
    // `max_items` entries or more than `max_size_bytes` bytes, and the tracked
    // size always equals the sum of entry sizes.
    #[test]
    fn prop_bounds_hold(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let (mut cache, clock) = cache();

        for op in ops {
            let oversized = matches!(op, CacheOp::Set { size, .. } if size > TEST_MAX_BYTES);
            let stored = apply(&mut cache, &clock, op);
            if oversized {
                prop_assert_eq!(stored, Some(false));
            }

            prop_assert!(cache.len() <= TEST_MAX_ITEMS);
            prop_assert!(cache.size_bytes() <= TEST_MAX_BYTES);
            prop_assert_eq!(cache.size_bytes(), cache.recomputed_size());
            prop_assert!(cache.expiry_index_consistent());
        }
    }

    // *For any* set that fits the byte budget, the write succeeds and the new
    // entry is readable immediately afterwards.
    #[test]
    fn prop_fitting_set_is_stored(
        ops in prop::collection::vec(cache_op_strategy(), 0..40),
        key in key_strategy(),
        size in 1u64..=TEST_MAX_BYTES,
        priority in 0i32..3
    ) {
        let (mut cache, clock) = cache();
        for op in ops {
            apply(&mut cache, &clock, op);
        }

        prop_assert!(cache.set(key.clone(), "v".to_string(), SetOptions::new().size(size).priority(priority)));
        prop_assert!(cache.get(&key).is_some());
    }

    // *For any* set of same-sized entries with distinct priorities inserted
    // highest first, each overflow evicts the lowest-priority resident even
    // though it is also the most recently used one. New writes are always
    // admitted, so the final survivors are the highest residents plus the
    // last write.
    #[test]
    fn prop_lowest_priority_evicted_first(
        priorities in prop::collection::hash_set(-50i32..50, TEST_MAX_ITEMS + 1..TEST_MAX_ITEMS + 5)
    ) {
        let (mut cache, _) = cache();
        let mut ordered: Vec<i32> = priorities.into_iter().collect();
        ordered.sort_unstable();

        for priority in ordered.iter().rev() {
            cache.set(priority.to_string(), "v".to_string(), SetOptions::new().size(1).priority(*priority));
        }

        let evicted = ordered.len() - TEST_MAX_ITEMS;
        let mut survivors: HashSet<i32> =
            ordered[ordered.len() - (TEST_MAX_ITEMS - 1)..].iter().copied().collect();
        survivors.insert(ordered[0]);
        for priority in &ordered {
            prop_assert_eq!(
                cache.has(&priority.to_string()),
                survivors.contains(priority),
                "priority {}", priority
            );
        }
        prop_assert_eq!(cache.stats().evictions as usize, evicted);
    }

    // *For any* sequence of operations, hits and misses count exactly the
    // `get` calls that found or missed a live entry.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let (mut cache, clock) = cache();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            let is_get = matches!(op, CacheOp::Get { .. });
            let outcome = apply(&mut cache, &clock, op);
            if is_get {
                match outcome {
                    Some(true) => expected_hits += 1,
                    _ => expected_misses += 1,
                }
            }
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.item_count, cache.len(), "Item count mismatch");
    }
}
