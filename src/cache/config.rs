//! Cache Configuration
//!
//! Construction-time limits for the cache and per-call options for `set`.

use std::time::Duration;

use crate::error::{GuardError, Result};

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of live entries
    pub max_items: usize,
    /// Maximum total estimated size of live entries, in bytes
    pub max_size_bytes: u64,
    /// TTL for entries stored without one; `None` never expires
    pub default_ttl: Option<Duration>,
    /// Interval between background prunes
    pub prune_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: 1000,
            max_size_bytes: 50 * 1024 * 1024,
            default_ttl: Some(Duration::from_secs(60 * 60)),
            prune_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Sets the item limit.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Sets the byte budget.
    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Sets the default TTL.
    pub fn with_default_ttl(mut self, default_ttl: Option<Duration>) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    // == Validate ==
    /// Checks the configuration for values the cache cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_items == 0 {
            return Err(GuardError::InvalidConfig(
                "cache max_items must be greater than zero".to_string(),
            ));
        }
        if self.max_size_bytes == 0 {
            return Err(GuardError::InvalidConfig(
                "cache max_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(GuardError::InvalidConfig(
                "cache default_ttl must be greater than zero".to_string(),
            ));
        }
        if self.prune_interval.is_zero() {
            return Err(GuardError::InvalidConfig(
                "cache prune_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// == Set Options ==
/// Per-entry options for [`crate::cache::BoundedCache::set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Entry TTL; falls back to the cache default
    pub ttl: Option<Duration>,
    /// Version tag for bulk invalidation
    pub version: Option<String>,
    /// Higher priorities are evicted later
    pub priority: i32,
    /// Size in bytes; estimated from the value when absent
    pub size: Option<u64>,
}

impl SetOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Tags the entry with a version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the eviction priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the size estimate.
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}
