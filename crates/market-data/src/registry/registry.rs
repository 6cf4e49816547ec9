//! Adapter registry and router.
//!
//! The registry owns every adapter together with its descriptor, in
//! registration order. Routing is a filter followed by a stable sort on
//! effective priority:
//!
//! - filter: enabled, declares the kind, covers the segment, accepts the
//!   symbol, not suspended
//! - effective priority: base priority, plus the rate-limit penalty while the
//!   adapter is rate limited
//!
//! Rate-limited adapters stay in the list as a last resort.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use super::{RateLimiter, SkipReason};
use crate::config::ProviderSettings;
use crate::errors::MarketDataError;
use crate::health::HealthTracker;
use crate::models::DataKind;
use crate::provider::{AdapterDescriptor, MarketDataProvider};
use crate::segment::Segment;

/// Added to the priority of a rate-limited adapter.
pub const DEFAULT_RATE_LIMIT_PENALTY: u32 = 1_000;

struct Registered {
    provider: Arc<dyn MarketDataProvider>,
    descriptor: Arc<AdapterDescriptor>,
}

/// One routable adapter for a request.
#[derive(Clone)]
pub struct Candidate {
    pub provider: Arc<dyn MarketDataProvider>,
    pub descriptor: Arc<AdapterDescriptor>,
    pub effective_priority: u32,
    pub rate_limited: bool,
}

impl Candidate {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.descriptor.name)
            .field("effective_priority", &self.effective_priority)
            .field("rate_limited", &self.rate_limited)
            .finish()
    }
}

/// Routing verdict for one adapter, as returned by [`ProviderRegistry::explain`].
#[derive(Clone, Debug, PartialEq)]
pub struct RouteDecision {
    pub provider: String,
    /// Effective priority when eligible, the skip reason otherwise.
    pub verdict: Result<u32, SkipReason>,
}

/// Registry of adapters with health-aware routing.
pub struct ProviderRegistry {
    entries: Vec<Registered>,
    health: Arc<HealthTracker>,
    rate_limiter: Arc<RateLimiter>,
    rate_limit_penalty: u32,
}

impl ProviderRegistry {
    pub fn new(health: Arc<HealthTracker>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            entries: Vec::new(),
            health,
            rate_limiter,
            rate_limit_penalty: DEFAULT_RATE_LIMIT_PENALTY,
        }
    }

    pub fn with_penalty(mut self, penalty: u32) -> Self {
        self.rate_limit_penalty = penalty;
        self
    }

    /// Register an adapter, applying optional configuration overrides to its
    /// descriptor. Names must be unique.
    ///
    /// Configures the adapter's local budget and health thresholds.
    pub fn register(
        &mut self,
        provider: Arc<dyn MarketDataProvider>,
        settings: Option<&ProviderSettings>,
    ) -> Result<(), MarketDataError> {
        let mut descriptor = provider.descriptor();
        if descriptor.name.is_empty() {
            return Err(MarketDataError::Configuration(format!(
                "adapter '{}' has an empty descriptor name",
                provider.id()
            )));
        }
        if self.get(&descriptor.name).is_some() {
            return Err(MarketDataError::Configuration(format!(
                "adapter '{}' registered twice",
                descriptor.name
            )));
        }
        if let Some(settings) = settings {
            descriptor = settings.apply(descriptor);
        }

        self.rate_limiter
            .configure(&descriptor.name, &descriptor.rate_limit);
        self.health.register(&descriptor);

        info!(
            "Registered adapter '{}' (priority {}, enabled {}, kinds {:?}, segments {:?})",
            descriptor.name, descriptor.priority, descriptor.enabled, descriptor.kinds, descriptor.segments
        );
        self.entries.push(Registered {
            provider,
            descriptor: Arc::new(descriptor),
        });
        Ok(())
    }

    /// Ordered adapters able to serve `kind` for `symbol` in `segment`.
    ///
    /// An empty list is a valid answer: nothing can serve the request.
    pub fn candidates(&self, kind: DataKind, segment: Segment, symbol: &str) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let (effective_priority, rate_limited) =
                    self.eligibility(entry, kind, segment, symbol).ok()?;
                Some(Candidate {
                    provider: Arc::clone(&entry.provider),
                    descriptor: Arc::clone(&entry.descriptor),
                    effective_priority,
                    rate_limited,
                })
            })
            .collect();

        // `sort_by_key` is stable, so ties keep registration order.
        candidates.sort_by_key(|c| c.effective_priority);

        debug!(
            "Route {} {} ({}): {:?}",
            kind,
            symbol,
            segment,
            candidates.iter().map(Candidate::name).collect::<Vec<_>>()
        );
        candidates
    }

    /// Routing verdict for every registered adapter, in registration order.
    pub fn explain(&self, kind: DataKind, segment: Segment, symbol: &str) -> Vec<RouteDecision> {
        self.entries
            .iter()
            .map(|entry| RouteDecision {
                provider: entry.descriptor.name.to_string(),
                verdict: self
                    .eligibility(entry, kind, segment, symbol)
                    .map(|(priority, _)| priority),
            })
            .collect()
    }

    fn eligibility(
        &self,
        entry: &Registered,
        kind: DataKind,
        segment: Segment,
        symbol: &str,
    ) -> Result<(u32, bool), SkipReason> {
        let descriptor = &entry.descriptor;
        if !descriptor.enabled {
            return Err(SkipReason::Disabled);
        }
        if !descriptor.supports_kind(kind) {
            return Err(SkipReason::KindNotSupported(kind));
        }
        if !descriptor.supports_segment(segment) {
            return Err(SkipReason::SegmentNotCovered(segment));
        }
        if !entry.provider.supports_symbol(symbol) {
            return Err(SkipReason::SymbolNotSupported);
        }
        if let Some(remaining) = self.health.suspension(&descriptor.name) {
            return Err(SkipReason::Suspended { remaining });
        }

        let rate_limited = self.health.is_rate_limited(&descriptor.name);
        let penalty = if rate_limited { self.rate_limit_penalty } else { 0 };
        Ok((descriptor.priority.saturating_add(penalty), rate_limited))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MarketDataProvider>> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.name == name)
            .map(|entry| Arc::clone(&entry.provider))
    }

    /// Descriptors of every registered adapter, in registration order.
    pub fn descriptors(&self) -> Vec<Arc<AdapterDescriptor>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.descriptor))
            .collect()
    }

    /// Every registered adapter with its descriptor.
    pub fn providers(&self) -> Vec<(Arc<AdapterDescriptor>, Arc<dyn MarketDataProvider>)> {
        self.entries
            .iter()
            .map(|entry| (Arc::clone(&entry.descriptor), Arc::clone(&entry.provider)))
            .collect()
    }

    /// Adapter-specific TTL overrides, by adapter name.
    pub fn ttl_overrides(&self, name: &str) -> Option<&HashMap<DataKind, std::time::Duration>> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.name == name)
            .map(|entry| &entry.descriptor.ttl_overrides)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    struct MockProvider {
        id: &'static str,
        priority: u32,
        kinds: Vec<DataKind>,
        segments: Vec<Segment>,
        rejects: Option<&'static str>,
    }

    impl MockProvider {
        fn new(id: &'static str, priority: u32) -> Self {
            Self {
                id,
                priority,
                kinds: vec![DataKind::Quote],
                segments: vec![Segment::UnitedStates],
                rejects: None,
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for MockProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn descriptor(&self) -> AdapterDescriptor {
            AdapterDescriptor::new(self.id)
                .priority(self.priority)
                .kinds(&self.kinds)
                .segments(&self.segments)
                .max_consecutive_failures(1)
        }

        fn supports_symbol(&self, symbol: &str) -> bool {
            self.rejects != Some(symbol)
        }
    }

    fn registry_with(providers: Vec<MockProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new(
            Arc::new(HealthTracker::new()),
            Arc::new(RateLimiter::new()),
        );
        for provider in providers {
            registry.register(Arc::new(provider), None).unwrap();
        }
        registry
    }

    fn names(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(Candidate::name).collect()
    }

    #[test]
    fn test_ordering_by_priority() {
        let registry = registry_with(vec![
            MockProvider::new("C", 30),
            MockProvider::new("A", 10),
            MockProvider::new("B", 20),
        ]);

        let candidates = registry.candidates(DataKind::Quote, Segment::UnitedStates, "AAPL");
        assert_eq!(names(&candidates), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let registry = registry_with(vec![
            MockProvider::new("FIRST", 10),
            MockProvider::new("SECOND", 10),
        ]);

        let candidates = registry.candidates(DataKind::Quote, Segment::UnitedStates, "AAPL");
        assert_eq!(names(&candidates), vec!["FIRST", "SECOND"]);
    }

    #[test]
    fn test_filters_kind_segment_and_symbol() {
        let mut options = MockProvider::new("OPTIONS_ONLY", 1);
        options.kinds = vec![DataKind::OptionsChain];
        let mut china = MockProvider::new("CHINA_ONLY", 2);
        china.segments = vec![Segment::ChinaA];
        let mut picky = MockProvider::new("PICKY", 3);
        picky.rejects = Some("AAPL");

        let registry = registry_with(vec![options, china, picky, MockProvider::new("ANY", 4)]);

        let candidates = registry.candidates(DataKind::Quote, Segment::UnitedStates, "AAPL");
        assert_eq!(names(&candidates), vec!["ANY"]);

        let explained = registry.explain(DataKind::Quote, Segment::UnitedStates, "AAPL");
        assert_eq!(
            explained[0].verdict,
            Err(SkipReason::KindNotSupported(DataKind::Quote))
        );
        assert_eq!(
            explained[1].verdict,
            Err(SkipReason::SegmentNotCovered(Segment::UnitedStates))
        );
        assert_eq!(explained[2].verdict, Err(SkipReason::SymbolNotSupported));
        assert_eq!(explained[3].verdict, Ok(4));
    }

    #[test]
    fn test_no_capable_provider_is_empty() {
        let registry = registry_with(vec![MockProvider::new("US", 1)]);
        assert!(registry
            .candidates(DataKind::Quote, Segment::ChinaFutures, "RB2405")
            .is_empty());
    }

    #[test]
    fn test_rate_limited_sorts_last() {
        let registry = registry_with(vec![
            MockProvider::new("A", 10),
            MockProvider::new("B", 20),
            MockProvider::new("C", 5),
        ]);
        registry
            .health()
            .record_rate_limited("C", Some(Duration::from_secs(60)));

        let candidates = registry.candidates(DataKind::Quote, Segment::UnitedStates, "AAPL");
        assert_eq!(names(&candidates), vec!["A", "B", "C"]);
        assert!(candidates[2].rate_limited);
        assert_eq!(candidates[2].effective_priority, 5 + DEFAULT_RATE_LIMIT_PENALTY);
        // Descriptor untouched.
        assert_eq!(candidates[2].descriptor.priority, 5);
    }

    #[test]
    fn test_custom_penalty() {
        let registry = registry_with(vec![MockProvider::new("A", 10), MockProvider::new("B", 20)])
            .with_penalty(5);
        registry
            .health()
            .record_rate_limited("A", Some(Duration::from_secs(60)));

        let candidates = registry.candidates(DataKind::Quote, Segment::UnitedStates, "AAPL");
        assert_eq!(names(&candidates), vec!["A", "B"]);
        assert_eq!(candidates[0].effective_priority, 15);
    }

    #[test]
    fn test_suspended_is_filtered() {
        let registry = registry_with(vec![MockProvider::new("A", 10), MockProvider::new("B", 20)]);
        registry.health().record_failure("A", "boom");

        let candidates = registry.candidates(DataKind::Quote, Segment::UnitedStates, "AAPL");
        assert_eq!(names(&candidates), vec!["B"]);
        assert!(matches!(
            registry.explain(DataKind::Quote, Segment::UnitedStates, "AAPL")[0].verdict,
            Err(SkipReason::Suspended { .. })
        ));
    }

    #[test]
    fn test_settings_override_priority_and_enabled() {
        let mut registry = ProviderRegistry::new(
            Arc::new(HealthTracker::new()),
            Arc::new(RateLimiter::new()),
        );
        registry
            .register(
                Arc::new(MockProvider::new("A", 10)),
                Some(&ProviderSettings::with_priority(50)),
            )
            .unwrap();
        registry
            .register(Arc::new(MockProvider::new("B", 20)), None)
            .unwrap();
        registry
            .register(
                Arc::new(MockProvider::new("C", 1)),
                Some(&ProviderSettings::disabled()),
            )
            .unwrap();

        let candidates = registry.candidates(DataKind::Quote, Segment::UnitedStates, "AAPL");
        assert_eq!(names(&candidates), vec!["B", "A"]);
        assert_eq!(registry.descriptors().len(), 3);
        assert!(!registry.descriptors()[2].enabled);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = registry_with(vec![MockProvider::new("A", 10)]);
        let err = registry
            .register(Arc::new(MockProvider::new("A", 20)), None)
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Configuration(_)));
        assert_eq!(registry.len(), 1);
    }
}
