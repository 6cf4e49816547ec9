//! Quoteflow Market Data Crate
//!
//! One dependable source of quotes, price history, fundamentals, options and
//! macro series on top of many unreliable, rate-limited upstream providers.
//!
//! # Overview
//!
//! - Five markets: China A-shares, US and Hong Kong equities, China futures
//!   and macro-economic indicators
//! - Five adapters: Yahoo Finance, Finnhub, Alpha Vantage, Eastmoney, Sina futures
//! - Priority routing with failover, rate-limit demotion and suspension of
//!   failing adapters
//! - Two-level cache (LRU plus SQLite) with per-kind TTLs
//! - Coalescing of identical concurrent requests
//! - A bounded log of every call with latency percentiles
//!
//! # Architecture
//!
//! ```text
//!     caller
//!       |
//!       v
//! +------------------+   hit   +------------------+
//! | MarketDataService| ------> | MultiLevelCache  |  (L1 LRU, L2 SQLite)
//! +------------------+         +------------------+
//!       | miss
//!       v
//! +------------------+
//! |   Deduplicator   |  (one adapter chain per key)
//! +------------------+
//!       |
//!       v
//! +------------------+         +------------------+
//! | ProviderRegistry | <-----> |  HealthTracker   |
//! +------------------+         +------------------+
//!       | ordered candidates
//!       v
//! +------------------+
//! |    Adapters      |  (Yahoo, Finnhub, Alpha Vantage, ...)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`MarketDataService`] - The facade
//! - [`DataRequest`] / [`MarketData`] - Typed requests and payloads
//! - [`Segment`] - Market segment of a symbol, see [`segment::detect`]
//! - [`MarketDataProvider`] / [`AdapterDescriptor`] - The adapter contract
//! - [`MarketDataConfig`] - Tunables with defaults
//! - [`CallRecord`] - One facade call, as recorded by the metrics log

pub mod cache;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod registry;
pub mod segment;
pub mod service;

pub use config::{MarketDataConfig, ProviderSettings};
pub use errors::{FailureClass, MarketDataError};
pub use service::{MarketDataService, MarketDataServiceBuilder};

// Re-export all public types from models
pub use models::{
    CompanyProfile, DataKind, DataRequest, Earnings, EarningsReport, Fundamentals, HistoryRange,
    Interval, MacroObservation, MacroSeries, MarketData, OptionContract, OptionExpirations,
    OptionsChain, PriceBar, PriceSeries, ProviderId, Quote,
};
pub use segment::Segment;

// Re-export provider types
pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::eastmoney::EastmoneyProvider;
pub use provider::finnhub::FinnhubProvider;
pub use provider::sina_futures::SinaFuturesProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::{AdapterDescriptor, MarketDataProvider, RateLimit};

// Re-export introspection types
pub use cache::{CacheKey, CacheStats, MemoryStore, PersistentStore, SqliteStore};
pub use health::{ProviderHealth, ProviderStatus};
pub use metrics::{CallFilter, CallOutcome, CallRecord, LatencyPercentiles, MetricsSummary};
pub use registry::{RouteDecision, SkipReason};
