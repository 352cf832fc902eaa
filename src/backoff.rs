//! Pure retry and backoff decisions
//!
//! Shared by the serial reopen loop and the publisher's per-event retry.
//! Nothing here sleeps; callers ask for a [`RetryDecision`] and act on it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with a capped delay and an optional attempt limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor applied per attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Maximum number of attempts (None = unlimited)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_multiplier() -> u32 {
    2
}

impl BackoffPolicy {
    /// Serial device reopen: 1s, 2s, 4s ... capped at 30s, retried forever
    pub fn serial_reopen() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2,
            max_attempts: None,
        }
    }

    /// Per-event publish retry: 200ms doubling up to 5s, five attempts total
    pub fn publish_retry() -> Self {
        Self {
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2,
            max_attempts: Some(5),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(exponent);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Decide whether another attempt may follow `failed_attempts` failures
    pub fn next_attempt(&self, failed_attempts: u32, shutdown_requested: bool) -> RetryDecision {
        if shutdown_requested {
            return RetryDecision::AbortShutdownRequested;
        }

        if let Some(max_attempts) = self.max_attempts {
            if failed_attempts >= max_attempts {
                return RetryDecision::AbortMaxAttemptsExceeded;
            }
        }

        RetryDecision::Proceed {
            attempt: failed_attempts + 1,
            delay: self.delay_for_attempt(failed_attempts),
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), String> {
        if self.initial_delay_ms == 0 {
            return Err(format!("{name}: initial_delay_ms must be greater than 0"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(format!(
                "{name}: max_delay_ms must be at least initial_delay_ms"
            ));
        }
        if self.multiplier == 0 {
            return Err(format!("{name}: multiplier must be greater than 0"));
        }
        if self.max_attempts == Some(0) {
            return Err(format!(
                "{name}: max_attempts must be greater than 0 or unset for unlimited"
            ));
        }
        Ok(())
    }
}

/// Outcome of asking the policy about the next attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt`
    Proceed { attempt: u32, delay: Duration },
    AbortShutdownRequested,
    AbortMaxAttemptsExceeded,
}
