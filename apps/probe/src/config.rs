use std::path::PathBuf;

use anyhow::Context;
use quoteflow_market_data::{DataKind, MarketDataConfig, ProviderSettings};

pub struct Config {
    pub symbols: Vec<String>,
    pub kinds: Vec<DataKind>,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub probe_health: bool,
    pub market_data: MarketDataConfig,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn number<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|value| value.parse::<T>().with_context(|| format!("Invalid {}", name)))
        .transpose()
}

impl Config {
    /// Read `QF_*` variables, after loading `.env` if present.
    ///
    /// Symbols given on the command line take precedence over `QF_SYMBOLS`.
    pub fn from_env(args: Vec<String>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let symbols = if args.is_empty() {
            var("QF_SYMBOLS").map(|s| list(&s)).unwrap_or_default()
        } else {
            args
        };

        let kinds = var("QF_KINDS")
            .map(|s| {
                list(&s)
                    .iter()
                    .map(|kind| {
                        kind.parse::<DataKind>()
                            .map_err(|e| anyhow::anyhow!("Invalid QF_KINDS entry '{}': {}", kind, e))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_else(|| vec![DataKind::Quote]);

        let mut market_data = match var("QF_CONFIG_FILE") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read QF_CONFIG_FILE {}", path))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid market data config in {}", path))?
            }
            None => MarketDataConfig::default(),
        };

        if let Some(capacity) = number("QF_L1_CAPACITY")? {
            market_data.l1_capacity = capacity;
        }
        if let Some(window) = number("QF_DEDUP_WINDOW_MS")? {
            market_data.dedup_window_ms = window;
        }
        if let Some(timeout) = number("QF_REQUEST_TIMEOUT_MS")? {
            market_data.request_timeout_ms = timeout;
        }
        if let Some(path) = var("QF_CACHE_PATH") {
            market_data.persistent_cache_path = Some(PathBuf::from(path));
        }
        for name in var("QF_DISABLED_PROVIDERS").map(|s| list(&s)).unwrap_or_default() {
            market_data
                .providers
                .insert(name.to_uppercase(), ProviderSettings::disabled());
        }

        Ok(Self {
            symbols,
            kinds,
            finnhub_api_key: var("QF_FINNHUB_API_KEY"),
            alpha_vantage_api_key: var("QF_ALPHA_VANTAGE_API_KEY"),
            probe_health: var("QF_PROBE_HEALTH").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
            market_data,
        })
    }
}
