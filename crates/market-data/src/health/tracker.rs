//! Per-adapter health tracking.
//!
//! Each adapter moves through three states:
//!
//! - **Healthy**: normal operation.
//! - **Suspended**: too many consecutive transient failures; the router
//!   filters the adapter out until its cooldown elapses.
//! - **Probationary**: the cooldown has elapsed; the next answer decides.
//!   A success or a not-found returns the adapter to Healthy, a failure
//!   suspends it again with a doubled cooldown.
//!
//! Rate-limit signals are tracked separately. They never count as failures,
//! they only mark the adapter as rate limited until a deadline.
//!
//! State is in-memory and resets on restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::status::{ProviderHealth, ProviderStatus};
use crate::provider::AdapterDescriptor;

/// Back-off applied to a rate-limited adapter that sent no retry hint.
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Suspensions never grow past this multiple of the base cooldown.
const MAX_COOLDOWN_MULTIPLIER: u32 = 16;

/// Health state machine position.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Suspended,
    Probationary,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Probationary => write!(f, "Probationary"),
        }
    }
}

/// Thresholds copied from the adapter descriptor at registration.
#[derive(Clone, Copy, Debug)]
struct HealthPolicy {
    max_consecutive_failures: u32,
    base_cooldown: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            base_cooldown: Duration::from_secs(60),
        }
    }
}

/// Snapshot of one adapter's health.
#[derive(Clone, Debug)]
pub struct AdapterHealth {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Cooldown applied by the current (or next) suspension.
    pub current_cooldown: Duration,
    /// Remaining suspension, when suspended.
    pub suspended_for: Option<Duration>,
    /// Remaining rate-limit back-off, when rate limited.
    pub rate_limited_for: Option<Duration>,
}

#[derive(Debug)]
struct Entry {
    policy: HealthPolicy,
    state: HealthState,
    consecutive_failures: u32,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_error: Option<String>,
    suspended_at: Option<Instant>,
    current_cooldown: Duration,
    rate_limited_until: Option<Instant>,
}

impl Entry {
    fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            state: HealthState::Healthy,
            consecutive_failures: 0,
            last_success: None,
            last_failure: None,
            last_error: None,
            suspended_at: None,
            current_cooldown: policy.base_cooldown,
            rate_limited_until: None,
        }
    }

    /// Moves Suspended to Probationary once the cooldown has elapsed and
    /// returns the remaining suspension otherwise.
    fn refresh(&mut self, provider: &str) -> Option<Duration> {
        if self.state != HealthState::Suspended {
            return None;
        }
        let elapsed = self.suspended_at.map(|at| at.elapsed()).unwrap_or_default();
        if elapsed >= self.current_cooldown {
            info!(
                "Health: '{}' cooldown of {:?} elapsed, moving to Probationary",
                provider, self.current_cooldown
            );
            self.state = HealthState::Probationary;
            self.suspended_at = None;
            None
        } else {
            Some(self.current_cooldown - elapsed)
        }
    }

    fn rate_limit_remaining(&mut self) -> Option<Duration> {
        let until = self.rate_limited_until?;
        let now = Instant::now();
        if until > now {
            Some(until - now)
        } else {
            self.rate_limited_until = None;
            None
        }
    }

    fn snapshot(&mut self, provider: &str) -> AdapterHealth {
        let suspended_for = self.refresh(provider);
        AdapterHealth {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            last_success: self.last_success,
            last_failure: self.last_failure,
            last_error: self.last_error.clone(),
            current_cooldown: self.current_cooldown,
            suspended_for,
            rate_limited_for: self.rate_limit_remaining(),
        }
    }
}

/// Thread-safe per-adapter health table.
///
/// Only the service writes to it (after each adapter attempt); the router
/// reads [`is_suspended`](Self::is_suspended) and
/// [`is_rate_limited`](Self::is_rate_limited).
pub struct HealthTracker {
    entries: Mutex<HashMap<String, Entry>>,
    default_backoff: Duration,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::with_backoff(DEFAULT_RATE_LIMIT_BACKOFF)
    }

    /// Tracker whose rate-limit back-off defaults to `default_backoff` when
    /// an adapter gives no retry hint.
    pub fn with_backoff(default_backoff: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_backoff,
        }
    }

    /// Lock the table, recovering from poison.
    ///
    /// A poisoned health table at worst holds a slightly stale counter.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Health tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Start tracking an adapter with the thresholds from its descriptor.
    pub fn register(&self, descriptor: &AdapterDescriptor) {
        let policy = HealthPolicy {
            max_consecutive_failures: descriptor.max_consecutive_failures.max(1),
            base_cooldown: descriptor.cooldown,
        };
        self.lock_entries()
            .insert(descriptor.name.to_string(), Entry::new(policy));
    }

    /// Remaining suspension for `provider`, or `None` when it may be called.
    ///
    /// Also performs the Suspended -> Probationary transition.
    pub fn suspension(&self, provider: &str) -> Option<Duration> {
        self.lock_entries().get_mut(provider)?.refresh(provider)
    }

    pub fn is_suspended(&self, provider: &str) -> bool {
        self.suspension(provider).is_some()
    }

    /// Remaining rate-limit back-off for `provider`, if any.
    pub fn rate_limit_remaining(&self, provider: &str) -> Option<Duration> {
        self.lock_entries().get_mut(provider)?.rate_limit_remaining()
    }

    pub fn is_rate_limited(&self, provider: &str) -> bool {
        self.rate_limit_remaining(provider).is_some()
    }

    pub fn state(&self, provider: &str) -> HealthState {
        let mut entries = self.lock_entries();
        match entries.get_mut(provider) {
            Some(entry) => {
                entry.refresh(provider);
                entry.state
            }
            None => HealthState::Healthy,
        }
    }

    /// A successful call. Clears the failure streak and restores the base cooldown.
    pub fn record_success(&self, provider: &str) {
        let mut entries = self.lock_entries();
        let entry = entries
            .entry(provider.to_string())
            .or_insert_with(|| Entry::new(HealthPolicy::default()));

        if entry.state != HealthState::Healthy {
            info!("Health: '{}' recovered ({} -> Healthy)", provider, entry.state);
        } else if entry.consecutive_failures > 0 {
            debug!(
                "Health: success for '{}', failure streak of {} reset",
                provider, entry.consecutive_failures
            );
        }

        entry.state = HealthState::Healthy;
        entry.consecutive_failures = 0;
        entry.suspended_at = None;
        entry.current_cooldown = entry.policy.base_cooldown;
        entry.last_success = Some(Utc::now());
    }

    /// A well-formed "no such data" answer. It proves the adapter is up, so
    /// it ends a probation and clears the failure streak like a success, but
    /// leaves `last_success` alone.
    pub fn record_not_found(&self, provider: &str) {
        let mut entries = self.lock_entries();
        let entry = entries
            .entry(provider.to_string())
            .or_insert_with(|| Entry::new(HealthPolicy::default()));

        entry.refresh(provider);
        match entry.state {
            HealthState::Probationary => {
                info!("Health: '{}' answered on probation, back to Healthy", provider);
                entry.state = HealthState::Healthy;
                entry.current_cooldown = entry.policy.base_cooldown;
            }
            // Still cooling down; a late answer does not lift the suspension.
            HealthState::Suspended => return,
            HealthState::Healthy => {}
        }
        entry.consecutive_failures = 0;
    }

    /// A transient failure (timeout, transport error, malformed body).
    pub fn record_failure(&self, provider: &str, error: &str) {
        let mut entries = self.lock_entries();
        let entry = entries
            .entry(provider.to_string())
            .or_insert_with(|| Entry::new(HealthPolicy::default()));

        entry.refresh(provider);
        entry.consecutive_failures += 1;
        entry.last_failure = Some(Utc::now());
        entry.last_error = Some(error.to_string());

        match entry.state {
            HealthState::Healthy => {
                if entry.consecutive_failures >= entry.policy.max_consecutive_failures {
                    info!(
                        "Health: suspending '{}' for {:?} after {} consecutive failures",
                        provider, entry.current_cooldown, entry.consecutive_failures
                    );
                    entry.state = HealthState::Suspended;
                    entry.suspended_at = Some(Instant::now());
                } else {
                    debug!(
                        "Health: failure for '{}' ({}/{})",
                        provider,
                        entry.consecutive_failures,
                        entry.policy.max_consecutive_failures
                    );
                }
            }
            HealthState::Probationary => {
                let cap = entry.policy.base_cooldown * MAX_COOLDOWN_MULTIPLIER;
                entry.current_cooldown = (entry.current_cooldown * 2).min(cap);
                info!(
                    "Health: '{}' failed its probationary call, suspending again for {:?}",
                    provider, entry.current_cooldown
                );
                entry.state = HealthState::Suspended;
                entry.suspended_at = Some(Instant::now());
            }
            HealthState::Suspended => {
                debug!(
                    "Health: additional failure for '{}' (already suspended)",
                    provider
                );
            }
        }
    }

    /// An explicit quota signal. Does not touch the failure streak.
    pub fn record_rate_limited(&self, provider: &str, retry_after: Option<Duration>) {
        let backoff = retry_after.unwrap_or(self.default_backoff);
        let mut entries = self.lock_entries();
        let entry = entries
            .entry(provider.to_string())
            .or_insert_with(|| Entry::new(HealthPolicy::default()));

        let until = Instant::now() + backoff;
        // Keep the later deadline when signals overlap.
        entry.rate_limited_until = Some(match entry.rate_limited_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
        warn!(
            "Health: '{}' rate limited, deprioritised for {:?}",
            provider, backoff
        );
    }

    /// Return an adapter to a fresh Healthy state.
    pub fn reset(&self, provider: &str) -> bool {
        let mut entries = self.lock_entries();
        match entries.get_mut(provider) {
            Some(entry) => {
                info!("Health: manually resetting '{}'", provider);
                *entry = Entry::new(entry.policy);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, provider: &str) -> Option<AdapterHealth> {
        self.lock_entries()
            .get_mut(provider)
            .map(|entry| entry.snapshot(provider))
    }

    /// Reported status of every tracked adapter, keyed by name.
    pub fn status(&self) -> BTreeMap<String, ProviderHealth> {
        let mut entries = self.lock_entries();
        entries
            .iter_mut()
            .map(|(name, entry)| {
                let health = entry.snapshot(name);
                let status = ProviderStatus::from_health(&health);
                (name.clone(), ProviderHealth::new(status, health))
            })
            .collect()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(name: &'static str, failures: u32, cooldown: Duration) -> HealthTracker {
        let tracker = HealthTracker::new();
        tracker.register(
            &AdapterDescriptor::new(name)
                .max_consecutive_failures(failures)
                .cooldown(cooldown),
        );
        tracker
    }

    #[test]
    fn test_starts_healthy() {
        let tracker = tracker_with("TEST", 3, Duration::from_secs(60));
        assert_eq!(tracker.state("TEST"), HealthState::Healthy);
        assert!(!tracker.is_suspended("TEST"));
        assert!(!tracker.is_rate_limited("TEST"));
    }

    #[test]
    fn test_unknown_provider_is_healthy() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.state("NOBODY"), HealthState::Healthy);
        assert!(!tracker.is_suspended("NOBODY"));
        assert!(tracker.snapshot("NOBODY").is_none());
    }

    #[test]
    fn test_suspends_after_threshold() {
        let tracker = tracker_with("FAILING", 3, Duration::from_secs(60));

        tracker.record_failure("FAILING", "timeout");
        tracker.record_failure("FAILING", "timeout");
        assert!(!tracker.is_suspended("FAILING"));

        tracker.record_failure("FAILING", "timeout");
        assert!(tracker.is_suspended("FAILING"));
        assert_eq!(tracker.state("FAILING"), HealthState::Suspended);
    }

    #[test]
    fn test_success_resets_streak() {
        let tracker = tracker_with("FLAKY", 3, Duration::from_secs(60));

        tracker.record_failure("FLAKY", "reset by peer");
        tracker.record_failure("FLAKY", "reset by peer");
        tracker.record_success("FLAKY");
        tracker.record_failure("FLAKY", "reset by peer");

        let health = tracker.snapshot("FLAKY").unwrap();
        assert_eq!(health.consecutive_failures, 1);
        assert_eq!(health.state, HealthState::Healthy);
        assert!(health.last_success.is_some());
    }

    #[test]
    fn test_cooldown_leads_to_probation_then_recovery() {
        let tracker = tracker_with("RECOVERING", 1, Duration::from_millis(10));

        tracker.record_failure("RECOVERING", "HTTP 502");
        assert!(tracker.is_suspended("RECOVERING"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(!tracker.is_suspended("RECOVERING"));
        assert_eq!(tracker.state("RECOVERING"), HealthState::Probationary);

        tracker.record_success("RECOVERING");
        assert_eq!(tracker.state("RECOVERING"), HealthState::Healthy);
    }

    #[test]
    fn test_not_found_ends_probation() {
        let tracker = tracker_with("SPARSE", 1, Duration::from_millis(10));

        tracker.record_failure("SPARSE", "HTTP 502");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(tracker.state("SPARSE"), HealthState::Probationary);

        tracker.record_not_found("SPARSE");
        let health = tracker.snapshot("SPARSE").unwrap();
        assert_eq!(health.state, HealthState::Healthy);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_success.is_none());
    }

    #[test]
    fn test_not_found_keeps_suspension() {
        let tracker = tracker_with("COOLING", 1, Duration::from_secs(60));

        tracker.record_failure("COOLING", "HTTP 502");
        tracker.record_not_found("COOLING");
        assert!(tracker.is_suspended("COOLING"));
    }

    #[test]
    fn test_probationary_failure_doubles_cooldown() {
        let tracker = tracker_with("RELAPSING", 1, Duration::from_millis(10));

        tracker.record_failure("RELAPSING", "HTTP 500");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(tracker.state("RELAPSING"), HealthState::Probationary);

        tracker.record_failure("RELAPSING", "HTTP 500");
        let health = tracker.snapshot("RELAPSING").unwrap();
        assert_eq!(health.state, HealthState::Suspended);
        assert_eq!(health.current_cooldown, Duration::from_millis(20));
    }

    #[test]
    fn test_cooldown_is_capped() {
        let tracker = tracker_with("BROKEN", 1, Duration::from_millis(1));

        tracker.record_failure("BROKEN", "HTTP 500");
        for _ in 0..8 {
            // Wait out whatever the current cooldown is, then fail the probation.
            let wait = tracker.snapshot("BROKEN").unwrap().current_cooldown;
            std::thread::sleep(wait + Duration::from_millis(2));
            assert!(!tracker.is_suspended("BROKEN"));
            tracker.record_failure("BROKEN", "HTTP 500");
        }

        let health = tracker.snapshot("BROKEN").unwrap();
        assert_eq!(health.current_cooldown, Duration::from_millis(16));
    }

    #[test]
    fn test_success_restores_base_cooldown() {
        let tracker = tracker_with("HEALED", 1, Duration::from_millis(5));

        tracker.record_failure("HEALED", "HTTP 500");
        std::thread::sleep(Duration::from_millis(10));
        tracker.is_suspended("HEALED");
        tracker.record_failure("HEALED", "HTTP 500");
        assert_eq!(
            tracker.snapshot("HEALED").unwrap().current_cooldown,
            Duration::from_millis(10)
        );

        std::thread::sleep(Duration::from_millis(15));
        tracker.is_suspended("HEALED");
        tracker.record_success("HEALED");
        assert_eq!(
            tracker.snapshot("HEALED").unwrap().current_cooldown,
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_rate_limit_is_independent_of_failures() {
        let tracker = tracker_with("QUOTA", 1, Duration::from_secs(60));

        tracker.record_rate_limited("QUOTA", Some(Duration::from_secs(30)));
        assert!(tracker.is_rate_limited("QUOTA"));
        assert!(!tracker.is_suspended("QUOTA"));
        assert_eq!(tracker.snapshot("QUOTA").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_rate_limit_expires() {
        let tracker = HealthTracker::with_backoff(Duration::from_millis(10));
        tracker.register(&AdapterDescriptor::new("BRIEF"));

        tracker.record_rate_limited("BRIEF", None);
        assert!(tracker.is_rate_limited("BRIEF"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(!tracker.is_rate_limited("BRIEF"));
    }

    #[test]
    fn test_manual_reset() {
        let tracker = tracker_with("RESET", 1, Duration::from_secs(60));

        tracker.record_failure("RESET", "boom");
        tracker.record_rate_limited("RESET", None);
        assert!(tracker.reset("RESET"));

        assert_eq!(tracker.state("RESET"), HealthState::Healthy);
        assert!(!tracker.is_rate_limited("RESET"));
        assert!(!tracker.reset("UNKNOWN"));
    }

    #[test]
    fn test_provider_isolation() {
        let tracker = HealthTracker::new();
        tracker.register(&AdapterDescriptor::new("A").max_consecutive_failures(1));
        tracker.register(&AdapterDescriptor::new("B").max_consecutive_failures(1));

        tracker.record_failure("A", "boom");
        assert!(tracker.is_suspended("A"));
        assert!(!tracker.is_suspended("B"));
    }

    #[test]
    fn test_status_reports_every_adapter() {
        let tracker = HealthTracker::new();
        tracker.register(&AdapterDescriptor::new("UP"));
        tracker.register(&AdapterDescriptor::new("DOWN").max_consecutive_failures(1));
        tracker.register(&AdapterDescriptor::new("LIMITED"));
        tracker.register(&AdapterDescriptor::new("WOBBLY"));

        tracker.record_failure("DOWN", "boom");
        tracker.record_rate_limited("LIMITED", None);
        tracker.record_failure("WOBBLY", "boom");

        let status = tracker.status();
        assert_eq!(status["UP"].status, ProviderStatus::Healthy);
        assert_eq!(status["DOWN"].status, ProviderStatus::Unavailable);
        assert_eq!(status["LIMITED"].status, ProviderStatus::RateLimited);
        assert_eq!(status["WOBBLY"].status, ProviderStatus::Degraded);
        assert_eq!(status["DOWN"].last_error.as_deref(), Some("boom"));
    }
}
