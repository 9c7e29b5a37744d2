//! Cache Entry Module
//!
//! A stored value plus the metadata eviction and expiry decide on.

use crate::cache::EvictionRank;

// == Cache Entry ==
/// A single cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Size charged against the byte budget
    pub size_bytes: u64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at_ms: u64,
    /// Last `get`/`has` hit (Unix milliseconds)
    pub last_accessed_ms: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at_ms: Option<u64>,
    /// Version tag for bulk invalidation
    pub version: Option<String>,
    /// Eviction priority, lowest goes first
    pub priority: i32,
    /// Hits since creation
    pub access_count: u64,
    /// Position in the eviction order
    pub(crate) rank: EvictionRank,
    /// Position in the expiry index, None = no expiration
    pub(crate) expiry_slot: Option<(u64, u64)>,
}

impl<V> CacheEntry<V> {
    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// Boundary condition: an entry is expired once the current time is
    /// greater than or equal to its expiration time.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at_ms {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(expires_at_ms: Option<u64>) -> CacheEntry<&'static str> {
        CacheEntry {
            value: "test",
            size_bytes: 8,
            created_at_ms: 1_000,
            last_accessed_ms: 1_000,
            expires_at_ms,
            version: None,
            priority: 0,
            access_count: 0,
            rank: EvictionRank::new(0, 1_000, 0),
            expiry_slot: expires_at_ms.map(|at| (at, 0)),
        }
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let entry = entry(None);
        assert!(!entry.is_expired_at(u64::MAX));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = entry(Some(2_000));

        assert!(!entry.is_expired_at(1_999));
        assert!(entry.is_expired_at(2_000), "Entry should be expired at boundary");
        assert!(entry.is_expired_at(2_001));
    }
}
