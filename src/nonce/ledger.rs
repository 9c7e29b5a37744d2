//! Nonce Ledger Module
//!
//! Per-owner store of accepted nonces. Rejects replays inside the TTL window
//! and, when strict ordering is on, numeric nonces that go backwards.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::clock::{duration_ms, SharedClock, SystemClock};
use crate::error::{ReasonCode, Result, VerificationResult};
use crate::nonce::record::parse_numeric;
use crate::nonce::{NonceConfig, NonceRecord, NonceValidatorStats};

// == Nonce Ledger ==
/// Replay ledger partitioned by owner.
///
/// Identical nonce values may be used by different owners; within one owner a
/// nonce is accepted at most once per TTL window.
#[derive(Debug)]
pub struct NonceLedger {
    /// owner id -> (nonce -> record)
    records: HashMap<String, HashMap<String, NonceRecord>>,
    /// owner id -> highest numeric nonce accepted
    high_water: HashMap<String, i64>,
    /// Activity counters
    stats: NonceValidatorStats,
    config: NonceConfig,
    clock: SharedClock,
}

impl NonceLedger {
    // == Constructor ==
    /// Creates a ledger, failing fast on unusable configuration.
    pub fn new(config: NonceConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            records: HashMap::new(),
            high_water: HashMap::new(),
            stats: NonceValidatorStats::new(),
            config,
            clock,
        })
    }

    /// Creates a ledger with default configuration on the system clock.
    pub fn with_defaults() -> Result<Self> {
        Self::new(NonceConfig::default(), SystemClock::shared())
    }

    // == Validate ==
    /// Validates `nonce` for `owner_id` and records it on success.
    ///
    /// `timestamp_ms` is the request's own timestamp; it defaults to the
    /// ledger clock. Checks run in order: format, future skew, age, replay,
    /// then ordering. Rejections are returned, never raised.
    pub fn validate(
        &mut self,
        nonce: &str,
        owner_id: &str,
        timestamp_ms: Option<u64>,
    ) -> VerificationResult {
        let now = self.clock.now_ms();
        let timestamp = timestamp_ms.unwrap_or(now);
        let ttl_ms = duration_ms(self.config.ttl);

        if let Some(problem) = self.format_problem(nonce) {
            return self.reject(ReasonCode::InvalidFormat, owner_id, problem);
        }

        let tolerance_ms = duration_ms(self.config.future_tolerance);
        if timestamp > now.saturating_add(tolerance_ms) {
            return self.reject(
                ReasonCode::FutureTimestamp,
                owner_id,
                format!("timestamp {}ms ahead of ledger clock", timestamp - now),
            );
        }

        if timestamp <= now && now - timestamp >= ttl_ms {
            return self.reject(
                ReasonCode::Expired,
                owner_id,
                format!("timestamp is {}ms old", now - timestamp),
            );
        }

        let replayed = self
            .records
            .get(owner_id)
            .and_then(|owned| owned.get(nonce))
            .is_some_and(|record| !record.is_expired_at(now, ttl_ms));
        if replayed {
            return self.reject(
                ReasonCode::AlreadyUsed,
                owner_id,
                "nonce already used".to_string(),
            );
        }

        let numeric = parse_numeric(nonce);
        if self.config.strict_ordering {
            if let Some(value) = numeric {
                if let Some(&highest) = self.high_water.get(owner_id) {
                    if value < highest {
                        return self.reject(
                            ReasonCode::OutOfOrder,
                            owner_id,
                            format!("nonce {} is below high-water mark {}", value, highest),
                        );
                    }
                }
                self.high_water.insert(owner_id.to_string(), value);
            }
        }

        // Anchor future-dated requests at their own timestamp so the record
        // outlives every moment that timestamp is still acceptable.
        let record = NonceRecord::new(nonce, owner_id, now.max(timestamp));
        self.records
            .entry(owner_id.to_string())
            .or_default()
            .insert(nonce.to_string(), record);

        self.stats.record_valid();
        VerificationResult::accepted()
    }

    fn format_problem(&self, nonce: &str) -> Option<String> {
        let length = nonce.chars().count();
        if length == 0 {
            return Some("nonce is empty".to_string());
        }
        if length < self.config.min_length {
            return Some(format!(
                "nonce shorter than {} characters",
                self.config.min_length
            ));
        }
        if length > self.config.max_length {
            return Some(format!(
                "nonce longer than {} characters",
                self.config.max_length
            ));
        }
        if !nonce.chars().all(|c| c.is_ascii_graphic()) {
            return Some("nonce contains whitespace or non-ASCII characters".to_string());
        }
        None
    }

    fn reject(&mut self, reason: ReasonCode, owner_id: &str, message: String) -> VerificationResult {
        self.stats.record_rejection(reason);
        match reason {
            ReasonCode::AlreadyUsed | ReasonCode::OutOfOrder => {
                warn!("Nonce rejected for owner '{}': {} ({})", owner_id, reason, message);
            }
            _ => debug!("Nonce rejected for owner '{}': {} ({})", owner_id, reason, message),
        }
        VerificationResult::rejected(reason, message)
    }

    // == Sweep Expired ==
    /// Removes records older than the TTL and owners left without records.
    ///
    /// Returns the number of records removed. High-water marks are kept.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let ttl_ms = duration_ms(self.config.ttl);
        let mut removed = 0;

        self.records.retain(|_, owned| {
            let before = owned.len();
            owned.retain(|_, record| !record.is_expired_at(now, ttl_ms));
            removed += before - owned.len();
            !owned.is_empty()
        });

        self.stats.record_swept(removed);
        removed
    }

    // == Stats ==
    /// Returns a snapshot of ledger statistics.
    pub fn stats(&self) -> NonceValidatorStats {
        let mut stats = self.stats.clone();
        stats.active_owners = self.owner_count();
        stats.active_nonces = self.record_count();
        stats
    }

    // == Reset ==
    /// Forgets every record, high-water mark and counter.
    pub fn reset(&mut self) {
        self.records.clear();
        self.high_water.clear();
        self.stats = NonceValidatorStats::new();
    }

    /// Returns true if `nonce` is currently blocked for `owner_id`.
    pub fn is_used(&self, owner_id: &str, nonce: &str) -> bool {
        let now = self.clock.now_ms();
        let ttl_ms = duration_ms(self.config.ttl);
        self.records
            .get(owner_id)
            .and_then(|owned| owned.get(nonce))
            .is_some_and(|record| !record.is_expired_at(now, ttl_ms))
    }

    /// Returns the record held for (`owner_id`, `nonce`), expired or not.
    pub fn record(&self, owner_id: &str, nonce: &str) -> Option<&NonceRecord> {
        self.records.get(owner_id)?.get(nonce)
    }

    /// Number of owners with at least one record.
    pub fn owner_count(&self) -> usize {
        self.records.len()
    }

    /// Number of records held across all owners.
    pub fn record_count(&self) -> usize {
        self.records.values().map(HashMap::len).sum()
    }

    /// The ledger configuration.
    pub fn config(&self) -> &NonceConfig {
        &self.config
    }
}
