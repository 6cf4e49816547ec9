//! The facade callers talk to.
//!
//! A request flows through the cache, then the deduplicator, then the
//! failover loop in [`attempt`]. Every call, served or not, leaves one
//! [`CallRecord`] behind.
//!
//! Environmental failures (nothing can serve the symbol, every adapter failed,
//! the caller's deadline passed) come back as `Ok(None)`. Only defects such as
//! a payload of the wrong kind come back as `Err`.

mod attempt;
mod builder;

pub use builder::MarketDataServiceBuilder;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::future::join_all;
use log::{debug, error, info, warn};

use self::attempt::FetchOutcome;
use crate::cache::{CacheKey, CacheStats, MultiLevelCache};
use crate::config::MarketDataConfig;
use crate::dedup::{DedupStats, Deduplicator};
use crate::errors::{FailureClass, MarketDataError};
use crate::health::{ProviderHealth, ProviderStatus};
use crate::metrics::{
    CallFilter, CallOutcome, CallRecord, LatencyPercentiles, MetricsRecorder, MetricsSummary,
};
use crate::models::{
    CompanyProfile, DataKind, DataRequest, Earnings, FromMarketData, Fundamentals, HistoryRange,
    MacroSeries, MarketData, OptionExpirations, OptionsChain, PriceSeries, Quote,
};
use crate::provider::AdapterDescriptor;
use crate::registry::{ProviderRegistry, RouteDecision};
use crate::segment;

pub(crate) struct ServiceInner {
    registry: ProviderRegistry,
    cache: Arc<MultiLevelCache>,
    dedup: Deduplicator<CacheKey, FetchOutcome>,
    metrics: MetricsRecorder,
    dedup_window: Duration,
    request_timeout: Duration,
    compaction_interval: Option<Duration>,
}

/// Unified market data access. Cheap to clone; clones share every cache,
/// counter and adapter.
#[derive(Clone)]
pub struct MarketDataService {
    inner: Arc<ServiceInner>,
}

impl MarketDataService {
    pub fn builder(config: MarketDataConfig) -> MarketDataServiceBuilder {
        MarketDataServiceBuilder::new(config)
    }

    // ---- data ------------------------------------------------------------

    pub async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>, MarketDataError> {
        self.fetch_as(DataRequest::quote(symbol)).await
    }

    pub async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Option<PriceSeries>, MarketDataError> {
        self.fetch_as(DataRequest::history(symbol, range)).await
    }

    pub async fn get_fundamentals(
        &self,
        symbol: &str,
    ) -> Result<Option<Fundamentals>, MarketDataError> {
        self.fetch_as(DataRequest::fundamentals(symbol)).await
    }

    pub async fn get_company_info(
        &self,
        symbol: &str,
    ) -> Result<Option<CompanyProfile>, MarketDataError> {
        self.fetch_as(DataRequest::company_info(symbol)).await
    }

    /// Chain for `expiry`, or for the nearest expiration when `None`.
    pub async fn get_options_chain(
        &self,
        symbol: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<Option<OptionsChain>, MarketDataError> {
        self.fetch_as(DataRequest::options_chain(symbol, expiry)).await
    }

    pub async fn get_options_expirations(
        &self,
        symbol: &str,
    ) -> Result<Option<OptionExpirations>, MarketDataError> {
        self.fetch_as(DataRequest::options_expirations(symbol)).await
    }

    pub async fn get_earnings(&self, symbol: &str) -> Result<Option<Earnings>, MarketDataError> {
        self.fetch_as(DataRequest::earnings(symbol)).await
    }

    pub async fn get_macro_indicator(
        &self,
        name: &str,
    ) -> Result<Option<MacroSeries>, MarketDataError> {
        self.fetch_as(DataRequest::macro_indicator(name)).await
    }

    async fn fetch_as<T: FromMarketData>(
        &self,
        request: DataRequest,
    ) -> Result<Option<T>, MarketDataError> {
        self.fetch(request)
            .await?
            .map(T::from_market_data)
            .transpose()
    }

    /// Serve any request: cache, then one shared adapter chain per key.
    pub async fn fetch(&self, request: DataRequest) -> Result<Option<MarketData>, MarketDataError> {
        let started = Instant::now();
        let kind = request.kind();
        let symbol = request.symbol().into_owned();
        let key = CacheKey::for_request(&request);

        if let Some(data) = self.inner.cache.get(&key) {
            debug!("Cache hit for {}", key);
            self.record(CallRecord::new(kind, &symbol, CallOutcome::CacheHit, started.elapsed()));
            return Ok(Some(data));
        }

        let inner = Arc::clone(&self.inner);
        let work_key = key.clone();
        let flight = self
            .inner
            .dedup
            .execute_once(key, self.inner.dedup_window, move || async move {
                Ok(attempt::run(&inner, &request, &work_key).await)
            });

        match tokio::time::timeout(self.inner.request_timeout, flight).await {
            Ok(Ok(outcome)) => {
                self.record(
                    CallRecord::new(kind, &symbol, outcome.outcome, started.elapsed())
                        .attempted(outcome.attempted)
                        .used(outcome.used),
                );
                match outcome.error {
                    Some(e) => Err(e),
                    None => Ok(outcome.data),
                }
            }
            Ok(Err(e)) => {
                self.record(CallRecord::new(kind, &symbol, CallOutcome::Failure, started.elapsed()));
                if e.classify() == FailureClass::Fatal {
                    return Err(e);
                }
                Ok(None)
            }
            Err(_) => {
                warn!(
                    "{} {} timed out after {:?}",
                    kind, symbol, self.inner.request_timeout
                );
                self.record(CallRecord::new(kind, &symbol, CallOutcome::Timeout, started.elapsed()));
                Ok(None)
            }
        }
    }

    fn record(&self, record: CallRecord) {
        self.inner.metrics.record(record);
    }

    // ---- introspection ---------------------------------------------------

    /// Health and routing status of every registered adapter.
    pub fn provider_health(&self) -> BTreeMap<String, ProviderHealth> {
        self.inner.registry.health().status()
    }

    /// Call every adapter's `health_check` concurrently, each bounded by its
    /// own request timeout. Does not change recorded health.
    pub async fn probe_providers(&self) -> BTreeMap<String, ProviderStatus> {
        let checks = self
            .inner
            .registry
            .providers()
            .into_iter()
            .map(|(descriptor, provider)| async move {
                let name = descriptor.name.to_string();
                let result = match tokio::time::timeout(
                    descriptor.request_timeout,
                    provider.health_check(),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(MarketDataError::Timeout {
                        provider: name.clone(),
                    }),
                };
                if let Err(e) = &result {
                    info!("Health check for '{}' failed: {}", name, e);
                }
                (name, ProviderStatus::from_check(&result))
            });
        join_all(checks).await.into_iter().collect()
    }

    /// Routing verdict of every adapter for a request, in registration order.
    pub fn explain(&self, kind: DataKind, symbol: &str) -> Vec<RouteDecision> {
        let symbol = segment::normalize_symbol(symbol);
        self.inner
            .registry
            .explain(kind, segment::detect(&symbol), &symbol)
    }

    pub fn descriptors(&self) -> Vec<Arc<AdapterDescriptor>> {
        self.inner.registry.descriptors()
    }

    /// Matching call records, newest first.
    pub fn recent_calls(&self, filter: &CallFilter) -> Vec<CallRecord> {
        self.inner.metrics.recent_calls(filter)
    }

    pub fn latency_percentiles(&self, filter: &CallFilter) -> LatencyPercentiles {
        self.inner.metrics.latency_percentiles(filter)
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.inner.metrics.summary()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Adapter chains currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.dedup.in_flight()
    }

    pub fn dedup_stats(&self) -> DedupStats {
        self.inner.dedup.stats()
    }

    // ---- maintenance -----------------------------------------------------

    /// Drop cached answers of one kind for a symbol, whatever their parameters.
    pub fn invalidate(&self, kind: DataKind, symbol: &str) -> usize {
        self.inner.cache.invalidate_symbol(symbol, Some(kind))
    }

    pub fn invalidate_symbol(&self, symbol: &str) -> usize {
        self.inner.cache.invalidate_symbol(symbol, None)
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Forget an adapter's failures, suspension, rate limit and spent budget.
    /// Returns false for an unknown adapter.
    pub fn reset_provider(&self, name: &str) -> bool {
        if !self.inner.registry.health().reset(name) {
            error!("Cannot reset unknown adapter '{}'", name);
            return false;
        }
        self.inner.registry.rate_limiter().reset(name);
        info!("Adapter '{}' reset", name);
        true
    }

    /// Configured compaction period, if any.
    pub fn compaction_interval(&self) -> Option<Duration> {
        self.inner.compaction_interval
    }

    /// Sweep expired cache entries every `interval`. The task ends once every
    /// clone of the service is dropped.
    pub fn spawn_compaction(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.inner.cache.spawn_compaction(interval)
    }
}
