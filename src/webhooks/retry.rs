// Exponential backoff retry policy for webhook delivery
//
// Attempts are 1-indexed. After a failed attempt N the next attempt is
// scheduled base * 2^(N-1) later, until max_attempts have been made:
// 1s, 2s, 4s with the defaults, then give up.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default number of attempts per delivery chain (initial + retries)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Retry strategy configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay in milliseconds (default 1000ms)
    pub base_delay_ms: u64,
    /// Total attempts per chain, including the first (default 3)
    pub max_attempts: u32,
    /// Randomize each delay by up to ±20% (default off)
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            use_jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            base_delay_ms: base_delay.as_millis() as u64,
            max_attempts,
            use_jitter: false,
        }
    }

    pub fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay
    Retry(Duration),
    /// Retry budget spent
    GiveUp,
}

/// Decide whether a failed attempt gets retried, and after how long
///
/// # Arguments
/// * `attempt` - The attempt that just failed (1 = first attempt)
/// * `config` - Retry configuration
pub fn calculate_retry_delay(attempt: u32, config: &RetryConfig) -> RetryDecision {
    if attempt >= config.max_attempts {
        debug!(attempt, max_attempts = config.max_attempts, "Retry budget spent, giving up");
        return RetryDecision::GiveUp;
    }

    let exponent = attempt.saturating_sub(1);
    let delay_ms = config
        .base_delay_ms
        .saturating_mul(2_u64.saturating_pow(exponent));

    let delay_ms = if config.use_jitter && delay_ms > 0 {
        let jitter = (delay_ms as f64 * 0.2) as u64;
        let mut rng = rand::rng();
        let offset = rng.random_range(0..=jitter);
        if rng.random_bool(0.5) {
            delay_ms.saturating_add(offset)
        } else {
            delay_ms.saturating_sub(offset)
        }
    } else {
        delay_ms
    };

    debug!(attempt, delay_ms, "Scheduling retry");
    RetryDecision::Retry(Duration::from_millis(delay_ms))
}
