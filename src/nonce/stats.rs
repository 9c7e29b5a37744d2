//! Nonce Statistics Module
//!
//! Counts processed, accepted and rejected nonces.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ReasonCode;

// == Nonce Validator Stats ==
/// Snapshot of ledger activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NonceValidatorStats {
    /// Validation calls handled
    pub total_processed: u64,
    /// Validation calls that accepted the nonce
    pub total_valid: u64,
    /// Rejections keyed by reason
    pub rejections: BTreeMap<ReasonCode, u64>,
    /// Owners with at least one live record
    pub active_owners: usize,
    /// Records currently held
    pub active_nonces: usize,
    /// Records removed by sweeps
    pub swept: u64,
}

impl NonceValidatorStats {
    /// Creates empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted nonce.
    pub fn record_valid(&mut self) {
        self.total_processed += 1;
        self.total_valid += 1;
    }

    /// Records a rejection.
    pub fn record_rejection(&mut self, reason: ReasonCode) {
        self.total_processed += 1;
        *self.rejections.entry(reason).or_insert(0) += 1;
    }

    /// Records swept records.
    pub fn record_swept(&mut self, count: usize) {
        self.swept += count as u64;
    }

    /// Rejection count for one reason.
    pub fn rejected(&self, reason: ReasonCode) -> u64 {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    /// Total rejections across all reasons.
    pub fn total_rejected(&self) -> u64 {
        self.rejections.values().sum()
    }
}
