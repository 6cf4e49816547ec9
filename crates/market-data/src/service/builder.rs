use std::sync::Arc;

use log::info;

use super::{MarketDataService, ServiceInner};
use crate::cache::{MultiLevelCache, PersistentStore, SqliteStore, TtlPolicy};
use crate::config::MarketDataConfig;
use crate::dedup::Deduplicator;
use crate::errors::MarketDataError;
use crate::health::HealthTracker;
use crate::metrics::MetricsRecorder;
use crate::provider::MarketDataProvider;
use crate::registry::{ProviderRegistry, RateLimiter};

/// Assembles a [`MarketDataService`] from configuration and adapters.
///
/// ```ignore
/// let service = MarketDataService::builder(MarketDataConfig::default())
///     .provider(Arc::new(YahooProvider::new()))
///     .provider(Arc::new(EastmoneyProvider::new()))
///     .build()?;
/// ```
pub struct MarketDataServiceBuilder {
    config: MarketDataConfig,
    providers: Vec<Arc<dyn MarketDataProvider>>,
    store: Option<Arc<dyn PersistentStore>>,
}

impl MarketDataServiceBuilder {
    pub fn new(config: MarketDataConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            store: None,
        }
    }

    /// Add an adapter. Registration order breaks priority ties.
    pub fn provider(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers<I>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn MarketDataProvider>>,
    {
        self.providers.extend(providers);
        self
    }

    /// Use this L2 instead of the one named by `persistent_cache_path`.
    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<MarketDataService, MarketDataError> {
        let config = self.config;
        config.validate()?;

        let health = Arc::new(HealthTracker::with_backoff(
            config.default_rate_limit_backoff(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new());
        let mut registry =
            ProviderRegistry::new(health, rate_limiter).with_penalty(config.rate_limit_penalty);
        for provider in self.providers {
            let settings = config.provider_settings(provider.id());
            registry.register(provider, settings)?;
        }

        let store = match (self.store, &config.persistent_cache_path) {
            (Some(store), _) => Some(store),
            (None, Some(path)) => {
                info!("Opening persistent cache at {}", path.display());
                Some(Arc::new(SqliteStore::open(path)?) as Arc<dyn PersistentStore>)
            }
            (None, None) => None,
        };
        let mut cache = MultiLevelCache::new(config.l1_capacity, TtlPolicy::new(config.ttl_overrides()));
        if let Some(store) = store {
            cache = cache.with_store(store);
        }

        info!(
            "Market data service ready: {} adapters, L1 capacity {}, dedup window {:?}",
            registry.len(),
            config.l1_capacity,
            config.dedup_window()
        );

        Ok(MarketDataService {
            inner: Arc::new(ServiceInner {
                registry,
                cache: Arc::new(cache),
                dedup: Deduplicator::new(),
                metrics: MetricsRecorder::new(config.call_log_capacity),
                dedup_window: config.dedup_window(),
                request_timeout: config.request_timeout(),
                compaction_interval: config.compaction_interval(),
            }),
        })
    }
}
