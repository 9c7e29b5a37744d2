//! Nonce Record Module
//!
//! The immutable fact "this nonce was accepted for this owner at time T".

use serde::Serialize;

// == Nonce Record ==
/// An accepted nonce. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRecord {
    /// The nonce as presented
    pub value: String,
    /// Identity the nonce was accepted for
    pub owner_id: String,
    /// Unix milliseconds the record is anchored at
    pub seen_at_ms: u64,
    /// Integer reading of the nonce, when it parses fully as one
    pub numeric_value: Option<i64>,
}

impl NonceRecord {
    /// Creates a record anchored at `seen_at_ms`.
    pub fn new(value: &str, owner_id: &str, seen_at_ms: u64) -> Self {
        Self {
            value: value.to_string(),
            owner_id: owner_id.to_string(),
            seen_at_ms,
            numeric_value: parse_numeric(value),
        }
    }

    /// Returns true once `ttl_ms` has fully elapsed since the record was seen.
    ///
    /// The boundary is inclusive: a record exactly `ttl_ms` old is expired.
    pub fn is_expired_at(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.seen_at_ms) >= ttl_ms
    }
}

/// Parses a nonce that is entirely an (optionally signed) decimal integer.
pub(crate) fn parse_numeric(value: &str) -> Option<i64> {
    value.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_numeric_value() {
        assert_eq!(NonceRecord::new("1200", "u", 0).numeric_value, Some(1200));
        assert_eq!(NonceRecord::new("-7", "u", 0).numeric_value, Some(-7));
        assert_eq!(NonceRecord::new("12ab", "u", 0).numeric_value, None);
        assert_eq!(NonceRecord::new("abc123", "u", 0).numeric_value, None);
    }

    #[test]
    fn test_record_expiry_boundary() {
        let record = NonceRecord::new("abcd", "alice", 1_000);

        assert!(!record.is_expired_at(1_000, 500));
        assert!(!record.is_expired_at(1_499, 500));
        assert!(record.is_expired_at(1_500, 500), "boundary is inclusive");
    }

    #[test]
    fn test_record_clock_behind_record() {
        let record = NonceRecord::new("abcd", "alice", 10_000);
        assert!(!record.is_expired_at(5_000, 500));
    }
}
