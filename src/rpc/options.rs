//! Transport tuning: per-attempt timeout, retry/backoff limits and health thresholds.

use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_RETRIES: usize = 4;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 200;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;
const DEFAULT_DEGRADE_AFTER: usize = 2;
const DEFAULT_UNREACHABLE_AFTER: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Deadline of a single attempt.
    pub request_timeout: Duration,
    /// Additional attempts after the first one fails.
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failures before an endpoint is `Degraded`.
    pub degrade_after: usize,
    /// Consecutive failures before an endpoint is `Unreachable`.
    pub unreachable_after: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            degrade_after: DEFAULT_DEGRADE_AFTER,
            unreachable_after: DEFAULT_UNREACHABLE_AFTER,
        }
    }
}

impl TransportOptions {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout must be greater than 0"));
        }
        if self.initial_backoff.is_zero() {
            return Err(invalid("initial_backoff must be greater than 0"));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(invalid("max_backoff must not be smaller than initial_backoff"));
        }
        if self.degrade_after == 0 {
            return Err(invalid("degrade_after must be greater than 0"));
        }
        if self.unreachable_after < self.degrade_after {
            return Err(invalid("unreachable_after must not be smaller than degrade_after"));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based): `initial · 2^(attempt-1)`, capped.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        exponential_backoff(self.initial_backoff, self.max_backoff, attempt)
    }
}

pub(crate) fn exponential_backoff(initial: Duration, max: Duration, attempt: usize) -> Duration {
    if attempt <= 1 {
        return initial.min(max);
    }

    let exponent = attempt.saturating_sub(1) as u32;
    let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    initial.saturating_mul(multiplier).min(max)
}

fn invalid(message: &str) -> AppError {
    AppError::Config(message.to_string())
}
