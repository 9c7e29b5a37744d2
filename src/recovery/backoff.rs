//! Backoff strategies for retried operations.

use std::time::Duration;

use crate::error::{GuardError, Result};

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffConfig {
    /// Same delay before every retry.
    Fixed {
        /// Delay duration.
        delay: Duration,
    },

    /// Delay grows geometrically.
    Exponential {
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Upper bound on any single delay.
        max_delay: Duration,
        /// Growth factor per attempt.
        multiplier: f64,
    },

    /// Delay grows by a constant step.
    Linear {
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Added per further attempt.
        increment: Duration,
        /// Upper bound on any single delay.
        max_delay: Duration,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Attempt 0 is treated as attempt 1. Growth saturates at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let step = attempt.saturating_sub(1);
        match self {
            Self::Fixed { delay } => *delay,
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let exponent = i32::try_from(step).unwrap_or(i32::MAX);
                let secs = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                Duration::try_from_secs_f64(secs)
                    .unwrap_or(*max_delay)
                    .min(*max_delay)
            }
            Self::Linear {
                initial_delay,
                increment,
                max_delay,
            } => increment
                .checked_mul(step)
                .map_or(*max_delay, |grown| initial_delay.saturating_add(grown))
                .min(*max_delay),
        }
    }

    /// Checks the schedule for values that cannot produce sane delays.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed { .. } => Ok(()),
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if !multiplier.is_finite() || *multiplier < 1.0 {
                    return Err(GuardError::InvalidConfig(format!(
                        "backoff multiplier must be a finite value >= 1.0, got {multiplier}"
                    )));
                }
                check_bounds(*initial_delay, *max_delay)
            }
            Self::Linear {
                initial_delay,
                max_delay,
                ..
            } => check_bounds(*initial_delay, *max_delay),
        }
    }
}

fn check_bounds(initial_delay: Duration, max_delay: Duration) -> Result<()> {
    if max_delay < initial_delay {
        return Err(GuardError::InvalidConfig(format!(
            "backoff max_delay {max_delay:?} is below initial_delay {initial_delay:?}"
        )));
    }
    Ok(())
}
