//! Retry policy and failure classification.

use crate::error::{GuardError, Result};
use crate::recovery::BackoffConfig;

/// Classifies failures as transient or permanent.
pub trait Retryable {
    /// Returns true if trying again may succeed.
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for GuardError {
    fn is_retryable(&self) -> bool {
        // Bad input and rejections fail the same way every time.
        matches!(self, GuardError::Internal(_))
    }
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self.kind(),
            ErrorKind::Interrupted
                | ErrorKind::TimedOut
                | ErrorKind::WouldBlock
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::ConnectionRefused
        )
    }
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay schedule between attempts
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryPolicy {
    /// Policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the attempt limit.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay schedule.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Checks the policy for values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(GuardError::InvalidConfig(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        self.backoff.validate()
    }
}
