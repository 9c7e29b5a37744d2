//! Cache Module
//!
//! Bounded in-memory cache: item-count and byte-size limits, per-entry TTL,
//! version tags and priority-then-recency eviction.

mod config;
mod entry;
mod eviction;
mod fingerprint;
mod shared;
mod size;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use config::{CacheConfig, SetOptions};
pub use entry::CacheEntry;
pub use eviction::{EvictionRank, EvictionTracker};
pub use fingerprint::fingerprint;
pub use shared::SharedCache;
pub use size::SizeEstimate;
pub use stats::{AccessWindow, CacheStats};
pub use store::{BoundedCache, RemovalCause, RemovalListener};

// == Public Constants ==
/// Number of recent accesses averaged into `avg_access_time_us`
pub const ACCESS_WINDOW: usize = 100;
