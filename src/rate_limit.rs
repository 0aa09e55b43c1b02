//! Registration Rate Limiting
//!
//! Token bucket per client key (the peer IP address). Buckets start full and
//! refill continuously, so a client can burst up to capacity and then gets
//! one more request every `window / capacity`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Buckets tracked before idle ones get pruned
const PRUNE_THRESHOLD: usize = 10_000;

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Whole tokens left after this request
    pub remaining: u32,
    /// Seconds until a token is available (0 when allowed)
    pub retry_after_secs: u64,
}

impl RateLimitResult {
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_secs: 0,
        }
    }

    pub fn denied(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_secs: (retry_after.as_millis() as u64).div_ceil(1000),
        }
    }
}

/// Token bucket with continuous refill
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// Try to take one token
    pub fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Whole tokens currently available
    pub fn available(&self) -> u32 {
        self.tokens.floor() as u32
    }

    /// Time until one token is available
    pub fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 || self.refill_rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
    }

    fn is_full(&self) -> bool {
        let elapsed = Instant::now().duration_since(self.last_refill);
        self.tokens + elapsed.as_secs_f64() * self.refill_rate >= self.capacity
    }
}

/// Per-client registration limiter
#[derive(Debug)]
pub struct RegistrationLimiter {
    enabled: bool,
    capacity: u32,
    refill_rate: f64,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RegistrationLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let window = config.window_secs.max(1) as f64;
        Self {
            enabled: config.enabled,
            capacity: config.registrations_per_window,
            refill_rate: config.registrations_per_window as f64 / window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that allows everything
    pub fn disabled() -> Self {
        Self::new(&RateLimitConfig {
            enabled: false,
            ..Default::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registrations a client may burst before being limited
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Check and consume one registration for a client
    pub fn check(&self, client: &str) -> RateLimitResult {
        if !self.enabled {
            return RateLimitResult::allowed(self.capacity);
        }

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if buckets.len() >= PRUNE_THRESHOLD {
            buckets.retain(|_, bucket| !bucket.is_full());
        }

        let bucket = buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, self.refill_rate));

        if bucket.try_consume() {
            RateLimitResult::allowed(bucket.available())
        } else {
            debug!(client, "Registration rate limit exceeded");
            RateLimitResult::denied(bucket.time_until_available())
        }
    }
}
