//! Static description of an adapter: what it serves and how it may be called.

use std::collections::HashMap;
use std::time::Duration;

use crate::models::{DataKind, ProviderId};
use crate::segment::Segment;

/// Request budget for a provider.
///
/// Controls how aggressively we can call a provider to avoid
/// hitting their rate limits and getting blocked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum requests allowed per minute.
    pub requests_per_minute: u32,

    /// Maximum requests allowed per day, for providers with a daily quota.
    pub requests_per_day: Option<u32>,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_day: None,
        }
    }
}

/// Everything the registry, router and health tracker need to know about an adapter.
///
/// Immutable once registered. Routing computes an effective priority from it
/// without ever writing back.
#[derive(Clone, Debug)]
pub struct AdapterDescriptor {
    /// Unique adapter name ("YAHOO", "EASTMONEY", ...).
    pub name: ProviderId,

    /// Disabled adapters are never routed to.
    pub enabled: bool,

    /// Base priority; lower is preferred.
    pub priority: u32,

    /// Data kinds the adapter implements.
    pub kinds: Vec<DataKind>,

    /// Segments the adapter covers.
    pub segments: Vec<Segment>,

    /// Local request budget.
    pub rate_limit: RateLimit,

    /// Per-kind cache lifetime that beats the configured default.
    pub ttl_overrides: HashMap<DataKind, Duration>,

    /// Consecutive transient failures before the adapter is suspended.
    pub max_consecutive_failures: u32,

    /// Base suspension period.
    pub cooldown: Duration,

    /// Upper bound on a single adapter call.
    pub request_timeout: Duration,
}

impl AdapterDescriptor {
    /// Descriptor with defaults: priority 10, 60 requests per minute, three
    /// strikes, one minute cooldown, ten second call timeout.
    pub fn new(name: impl Into<ProviderId>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            priority: 10,
            kinds: Vec::new(),
            segments: Vec::new(),
            rate_limit: RateLimit::default(),
            ttl_overrides: HashMap::new(),
            max_consecutive_failures: 3,
            cooldown: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn kinds(mut self, kinds: &[DataKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn segments(mut self, segments: &[Segment]) -> Self {
        self.segments = segments.to_vec();
        self
    }

    pub fn rate_limit(mut self, requests_per_minute: u32, requests_per_day: Option<u32>) -> Self {
        self.rate_limit = RateLimit {
            requests_per_minute,
            requests_per_day,
        };
        self
    }

    pub fn ttl_override(mut self, kind: DataKind, ttl: Duration) -> Self {
        self.ttl_overrides.insert(kind, ttl);
        self
    }

    pub fn max_consecutive_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn supports_kind(&self, kind: DataKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn supports_segment(&self, segment: Segment) -> bool {
        self.segments.contains(&segment)
    }
}
