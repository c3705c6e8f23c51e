//! Token bucket pacing per source variant.
//!
//! Variants without a configured limit are never throttled.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::models::SourceVariant;

/// Largest burst a configured bucket allows.
const MAX_BURST_CAPACITY: f64 = 10.0;

/// Token bucket for a single variant.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
    /// Tokens per second.
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    fn with_config(config: &RateLimitConfig) -> Self {
        Self {
            tokens: config.burst_capacity,
            last_update: Instant::now(),
            rate: config.requests_per_minute as f64 / 60.0,
            capacity: config.burst_capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 || self.rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        }
    }
}

/// Pacing configuration for a variant.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_capacity: f64,
}

impl RateLimitConfig {
    /// Burst capacity scales with the rate, capped at [`MAX_BURST_CAPACITY`].
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_capacity: (requests_per_minute as f64 / 6.0).clamp(1.0, MAX_BURST_CAPACITY),
        }
    }
}

/// Token bucket rate limiter keyed by source variant.
pub struct RateLimiter {
    buckets: Mutex<HashMap<SourceVariant, TokenBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    ///
    /// Worst case after recovery is slightly off pacing.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<SourceVariant, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Limit a variant. Replaces any existing bucket.
    pub fn configure(&self, variant: SourceVariant, config: RateLimitConfig) {
        self.lock_buckets()
            .insert(variant, TokenBucket::with_config(&config));
    }

    pub fn is_limited(&self, variant: SourceVariant) -> bool {
        self.lock_buckets().contains_key(&variant)
    }

    /// Wait until a token is available for the variant.
    pub async fn acquire(&self, variant: SourceVariant) {
        loop {
            let wait_time = {
                let mut buckets = self.lock_buckets();
                let Some(bucket) = buckets.get_mut(&variant) else {
                    return;
                };

                if bucket.try_acquire() {
                    return;
                }

                bucket.time_until_available()
            };

            if wait_time > Duration::ZERO {
                debug!("Rate limiter: waiting {:?} for {}", wait_time, variant);
                tokio::time::sleep(wait_time).await;
            }
        }
    }

    /// Take a token without waiting. Unlimited variants always succeed.
    pub fn try_acquire(&self, variant: SourceVariant) -> bool {
        match self.lock_buckets().get_mut(&variant) {
            Some(bucket) => bucket.try_acquire(),
            None => true,
        }
    }

    /// Remaining tokens, or `None` for an unlimited variant.
    pub fn remaining_tokens(&self, variant: SourceVariant) -> Option<f64> {
        self.lock_buckets().get_mut(&variant).map(|bucket| {
            bucket.refill();
            bucket.tokens
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
