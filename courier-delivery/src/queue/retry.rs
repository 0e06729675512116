//! Retry policy with exponential backoff
//!
//! Transport and store failures get a fixed attempt budget; each retry
//! doubles the previous delay starting from the base.

use std::time::Duration;

use serde::Deserialize;

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_backoff_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// Total processing attempts before a job fails terminally.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds. Doubles per attempt.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Backoff for the given 1-indexed failed attempt:
    /// `base * 2^(attempt - 1)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        // Exponent capped so the shift cannot overflow
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1 << exponent))
    }
}
