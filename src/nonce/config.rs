//! Nonce Configuration
//!
//! Tunables for the nonce ledger, validated at construction.

use std::time::Duration;

use crate::error::{GuardError, Result};

/// Nonce ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceConfig {
    /// How long an accepted nonce blocks replays, and the maximum request age
    pub ttl: Duration,
    /// Allowed clock skew for timestamps ahead of the ledger clock
    pub future_tolerance: Duration,
    /// Shortest accepted nonce, in characters
    pub min_length: usize,
    /// Longest accepted nonce, in characters
    pub max_length: usize,
    /// Reject numeric nonces below the owner's highest accepted value
    pub strict_ordering: bool,
    /// Interval between background sweeps
    pub sweep_interval: Duration,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            future_tolerance: Duration::from_secs(60),
            min_length: 4,
            max_length: 256,
            strict_ordering: false,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl NonceConfig {
    /// Enables or disables strict numeric ordering.
    pub fn with_strict_ordering(mut self, strict: bool) -> Self {
        self.strict_ordering = strict;
        self
    }

    /// Sets the replay window.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the minimum nonce length.
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    // == Validate ==
    /// Checks the configuration for values the ledger cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(GuardError::InvalidConfig(
                "nonce ttl must be greater than zero".to_string(),
            ));
        }
        if self.min_length == 0 {
            return Err(GuardError::InvalidConfig(
                "nonce min_length must be at least 1".to_string(),
            ));
        }
        if self.max_length < self.min_length {
            return Err(GuardError::InvalidConfig(format!(
                "nonce max_length {} is below min_length {}",
                self.max_length, self.min_length
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(GuardError::InvalidConfig(
                "nonce sweep_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
