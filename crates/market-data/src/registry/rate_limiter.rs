//! Token bucket rate limiter for market data adapters.
//!
//! Each adapter gets a per-minute bucket and, when its descriptor declares a
//! daily quota, a per-day bucket. A call needs a token from both.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::provider::RateLimit;

const SECONDS_PER_MINUTE: f64 = 60.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// A single token bucket.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was updated.
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
}

impl TokenBucket {
    /// A full bucket holding `capacity` tokens, refilled over `period_secs`.
    fn new(capacity: u32, period_secs: f64) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: capacity / period_secs,
            capacity,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    /// Wait time until a token becomes available. Assumes a fresh refill.
    fn time_until_available(&self) -> Duration {
        if self.has_token() {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        }
    }
}

/// The minute and optional day bucket of one adapter.
#[derive(Debug)]
struct Budget {
    minute: TokenBucket,
    day: Option<TokenBucket>,
}

impl Budget {
    fn new(limit: &RateLimit) -> Self {
        Self {
            minute: TokenBucket::new(limit.requests_per_minute, SECONDS_PER_MINUTE),
            day: limit
                .requests_per_day
                .map(|per_day| TokenBucket::new(per_day, SECONDS_PER_DAY)),
        }
    }

    fn refill(&mut self) {
        self.minute.refill();
        if let Some(day) = self.day.as_mut() {
            day.refill();
        }
    }

    /// Takes one token from every bucket, or none at all.
    fn try_acquire(&mut self) -> bool {
        self.refill();

        let day_ok = self.day.as_ref().map_or(true, TokenBucket::has_token);
        if self.minute.has_token() && day_ok {
            self.minute.tokens -= 1.0;
            if let Some(day) = self.day.as_mut() {
                day.tokens -= 1.0;
            }
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        let minute = self.minute.time_until_available();
        let day = self
            .day
            .as_ref()
            .map(TokenBucket::time_until_available)
            .unwrap_or_default();
        minute.max(day)
    }
}

/// Token bucket rate limiter for multiple adapters.
///
/// Thread-safe. Buckets are created on demand from the adapter's configured
/// [`RateLimit`], or from the default limit for unknown adapters.
pub struct RateLimiter {
    /// Per-adapter budgets.
    buckets: Mutex<HashMap<String, Budget>>,
    /// Per-adapter limits.
    configs: Mutex<HashMap<String, RateLimit>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is slightly off accounting, which
    /// is better than panicking.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, Budget>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimit>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure limits for an adapter. Resets any existing budget.
    pub fn configure(&self, provider: &str, limit: &RateLimit) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), limit.clone());
        drop(configs); // Release configs lock before acquiring buckets lock

        let mut buckets = self.lock_buckets();
        buckets.remove(provider);
    }

    /// Take a token for `provider` without waiting.
    ///
    /// Returns false when either the minute or the day budget is spent.
    pub fn try_acquire(&self, provider: &str) -> bool {
        let mut buckets = self.lock_buckets();

        let budget = buckets
            .entry(provider.to_string())
            .or_insert_with(|| self.create_budget(provider));

        let acquired = budget.try_acquire();
        if !acquired {
            debug!("Rate limiter: local budget for '{}' exhausted", provider);
        }
        acquired
    }

    /// Time until `provider` can make another call.
    pub fn time_until_available(&self, provider: &str) -> Duration {
        let mut buckets = self.lock_buckets();
        match buckets.get_mut(provider) {
            Some(budget) => budget.time_until_available(),
            None => Duration::ZERO,
        }
    }

    /// Remaining tokens in the minute bucket.
    pub fn remaining_tokens(&self, provider: &str) -> f64 {
        let mut buckets = self.lock_buckets();

        if let Some(budget) = buckets.get_mut(provider) {
            budget.refill();
            budget.minute.tokens
        } else {
            drop(buckets);
            self.create_budget(provider).minute.tokens
        }
    }

    /// Restore a full budget for `provider`.
    pub fn reset(&self, provider: &str) {
        let mut buckets = self.lock_buckets();
        buckets.remove(provider);
    }

    fn create_budget(&self, provider: &str) -> Budget {
        let configs = self.lock_configs();
        match configs.get(provider) {
            Some(limit) => Budget::new(limit),
            None => Budget::new(&RateLimit::default()),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
