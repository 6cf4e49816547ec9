use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quoteflow_market_data::{
    segment, AlphaVantageProvider, CacheStats, DataKind, DataRequest, EastmoneyProvider,
    FinnhubProvider, HistoryRange, MarketData, MarketDataProvider, MarketDataService,
    MetricsSummary, ProviderHealth, ProviderStatus, Segment, SinaFuturesProvider, YahooProvider,
};
use serde::Serialize;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// Days of history fetched for a `history` probe.
const HISTORY_DAYS: i64 = 30;

pub fn init_tracing() {
    let log_format = std::env::var("QF_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Diagnostics go to stderr; stdout carries the JSON report.
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Real adapters. Keyed adapters are registered only when their key is set.
pub fn adapters(config: &Config) -> Vec<Arc<dyn MarketDataProvider>> {
    let mut adapters: Vec<Arc<dyn MarketDataProvider>> = vec![
        Arc::new(YahooProvider::new()),
        Arc::new(EastmoneyProvider::new()),
        Arc::new(SinaFuturesProvider::new()),
    ];
    if let Some(key) = &config.finnhub_api_key {
        adapters.push(Arc::new(FinnhubProvider::new(key.clone())));
    }
    if let Some(key) = &config.alpha_vantage_api_key {
        adapters.push(Arc::new(AlphaVantageProvider::new(key.clone())));
    }
    adapters
}

pub fn build_service(config: &Config) -> anyhow::Result<MarketDataService> {
    let service = MarketDataService::builder(config.market_data.clone())
        .providers(adapters(config))
        .build()?;
    if let Some(interval) = service.compaction_interval() {
        service.spawn_compaction(interval);
    }
    Ok(service)
}

pub fn request_for(kind: DataKind, symbol: &str) -> DataRequest {
    match kind {
        DataKind::Quote => DataRequest::quote(symbol),
        DataKind::History => DataRequest::history(symbol, HistoryRange::last_days(HISTORY_DAYS)),
        DataKind::Fundamentals => DataRequest::fundamentals(symbol),
        DataKind::CompanyInfo => DataRequest::company_info(symbol),
        DataKind::OptionsChain => DataRequest::options_chain(symbol, None),
        DataKind::OptionsExpirations => DataRequest::options_expirations(symbol),
        DataKind::Earnings => DataRequest::earnings(symbol),
        DataKind::MacroIndicator => DataRequest::macro_indicator(symbol),
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeResult {
    pub symbol: String,
    pub kind: DataKind,
    pub segment: Segment,
    pub data: Option<MarketData>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<ProbeResult>,
    pub health: BTreeMap<String, ProviderHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_checks: Option<BTreeMap<String, ProviderStatus>>,
    pub metrics: MetricsSummary,
    pub cache: CacheStats,
}

/// Fetch every kind for every symbol, concurrently per symbol.
pub async fn run(service: &MarketDataService, config: &Config) -> Report {
    let mut tasks = Vec::new();
    for symbol in &config.symbols {
        for &kind in &config.kinds {
            let service = service.clone();
            let request = request_for(kind, symbol);
            tasks.push(tokio::spawn(async move {
                let symbol = request.symbol().into_owned();
                let segment = segment::detect(&symbol);
                let (data, error) = match service.fetch(request).await {
                    Ok(data) => (data, None),
                    Err(e) => {
                        tracing::error!("{} {} failed: {}", kind, symbol, e);
                        (None, Some(e.to_string()))
                    }
                };
                ProbeResult {
                    symbol,
                    kind,
                    segment,
                    data,
                    error,
                }
            }));
        }
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!("Probe task failed: {}", e),
        }
    }

    let health_checks = if config.probe_health {
        Some(service.probe_providers().await)
    } else {
        None
    };

    Report {
        generated_at: Utc::now(),
        results,
        health: service.provider_health(),
        health_checks,
        metrics: service.metrics_summary(),
        cache: service.cache_stats(),
    }
}

#[cfg(test)]
mod tests {
    use quoteflow_market_data::MarketDataConfig;

    use super::*;

    fn config() -> Config {
        Config {
            symbols: Vec::new(),
            kinds: vec![DataKind::Quote],
            finnhub_api_key: None,
            alpha_vantage_api_key: None,
            probe_health: false,
            market_data: MarketDataConfig::default(),
        }
    }

    #[test]
    fn test_keyless_adapters_only() {
        let names: Vec<&str> = adapters(&config()).iter().map(|a| a.id()).collect();
        assert_eq!(names, vec!["YAHOO", "EASTMONEY", "SINA_FUTURES"]);

        let mut keyed = config();
        keyed.finnhub_api_key = Some("key".to_string());
        assert_eq!(adapters(&keyed).len(), 4);
    }

    #[test]
    fn test_request_for_macro_uses_indicator() {
        let request = request_for(DataKind::MacroIndicator, "cpi");
        assert_eq!(request.symbol(), "ECON:CPI");
        assert_eq!(request_for(DataKind::Quote, "aapl"), DataRequest::quote("AAPL"));
    }

    #[tokio::test]
    async fn test_empty_run_reports_health() {
        let service = build_service(&config()).unwrap();
        let report = run(&service, &config()).await;
        assert!(report.results.is_empty());
        assert_eq!(report.health.len(), 3);
        assert!(report.health_checks.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["health"]["YAHOO"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_sqlite_cache_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.market_data.persistent_cache_path = Some(dir.path().join("cache.db"));
        let service = build_service(&config).unwrap();
        assert_eq!(service.cache_stats().l2_size, Some(0));
    }
}
