//! Finnhub market data provider implementation.
//!
//! This module provides US equity data from the Finnhub API:
//! - Quotes via /quote
//! - Company profiles via /stock/profile2
//! - Fundamentals via /stock/metric
//! - Earnings surprises via /stock/earnings
//!
//! Finnhub free tier is limited to 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{
    CompanyProfile, DataKind, Earnings, EarningsReport, Fundamentals, Quote,
};
use crate::provider::http::{self, decimal};
use crate::provider::{AdapterDescriptor, MarketDataProvider};
use crate::segment::{self, Segment};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "FINNHUB";

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Change
    d: Option<f64>,
    /// Percent change
    dp: Option<f64>,
    /// High price of the day
    h: Option<f64>,
    /// Low price of the day
    l: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
}

/// Response from /stock/profile2 endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    name: Option<String>,
    exchange: Option<String>,
    currency: Option<String>,
    finnhub_industry: Option<String>,
    country: Option<String>,
    weburl: Option<String>,
    logo: Option<String>,
}

/// Response from /stock/metric endpoint. Values are keyed by Finnhub's metric names.
#[derive(Debug, Deserialize)]
struct MetricResponse {
    #[serde(default)]
    metric: HashMap<String, serde_json::Value>,
}

/// Item of the /stock/earnings array
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EarningsItem {
    actual: Option<f64>,
    estimate: Option<f64>,
    period: String,
    surprise: Option<f64>,
    surprise_percent: Option<f64>,
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Finnhub market data provider.
pub struct FinnhubProvider {
    client: Client,
    api_key: String,
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: http::build_client(Duration::from_secs(30)),
            api_key,
        }
    }

    /// Make a GET request to the Finnhub API.
    async fn fetch(
        &self,
        symbol: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let url = format!("{}{}", BASE_URL, endpoint);
        debug!("Finnhub request: {} with {} params", endpoint, params.len());

        // API key as header (more secure than query param)
        let request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .query(params);

        http::send(PROVIDER_ID, symbol, request).await
    }
}

fn metric(metrics: &HashMap<String, serde_json::Value>, name: &str) -> Option<Decimal> {
    metrics.get(name).and_then(|v| v.as_f64()).and_then(decimal)
}

/// Finnhub reports ratios such as margins and yields in percent.
fn percent_metric(metrics: &HashMap<String, serde_json::Value>, name: &str) -> Option<Decimal> {
    metric(metrics, name).map(|v| v / Decimal::ONE_HUNDRED)
}

fn parse_quote(symbol: &str, body: &str) -> Result<Quote, MarketDataError> {
    let response: QuoteResponse = http::parse_json(PROVIDER_ID, "quote", body)?;

    // Finnhub returns zeros for unknown symbols instead of an error
    let price = response
        .c
        .filter(|c| *c != 0.0 || response.pc.unwrap_or(0.0) != 0.0)
        .and_then(decimal)
        .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

    let mut quote = Quote::new(symbol, price, PROVIDER_ID);
    quote.open = response.o.and_then(decimal);
    quote.high = response.h.and_then(decimal);
    quote.low = response.l.and_then(decimal);
    quote.previous_close = response.pc.and_then(decimal);
    quote.change = response.d.and_then(decimal);
    quote.change_percent = response.dp.and_then(decimal);
    quote.currency = Some("USD".to_string());
    if let Some(ts) = response.t.and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
        quote.timestamp = ts;
    }
    Ok(quote.with_derived_change())
}

fn parse_profile(symbol: &str, body: &str) -> Result<CompanyProfile, MarketDataError> {
    let response: ProfileResponse = http::parse_json(PROVIDER_ID, "profile", body)?;
    let profile = CompanyProfile {
        source: PROVIDER_ID.to_string(),
        name: response.name,
        exchange: response.exchange,
        sector: None,
        industry: response.finnhub_industry,
        country: response.country,
        currency: response.currency,
        website: response.weburl,
        description: None,
        employees: None,
        logo_url: response.logo.filter(|l| !l.is_empty()),
    };
    // An unknown symbol comes back as `{}`
    if profile.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(profile)
}

fn parse_metrics(symbol: &str, body: &str) -> Result<Fundamentals, MarketDataError> {
    let response: MetricResponse = http::parse_json(PROVIDER_ID, "metric", body)?;
    let m = &response.metric;
    let millions = Decimal::from(1_000_000);

    let mut fundamentals = Fundamentals::new(symbol, PROVIDER_ID);
    fundamentals.market_cap = metric(m, "marketCapitalization").map(|v| v * millions);
    fundamentals.pe_ratio = metric(m, "peTTM");
    fundamentals.pb_ratio = metric(m, "pbAnnual");
    fundamentals.eps = metric(m, "epsTTM");
    fundamentals.dividend_yield = percent_metric(m, "dividendYieldIndicatedAnnual");
    fundamentals.beta = metric(m, "beta");
    fundamentals.revenue_ttm = metric(m, "revenueTTM").map(|v| v * millions);
    fundamentals.profit_margin = percent_metric(m, "netProfitMarginTTM");
    fundamentals.return_on_equity = percent_metric(m, "roeTTM");
    fundamentals.week52_high = metric(m, "52WeekHigh");
    fundamentals.week52_low = metric(m, "52WeekLow");

    if fundamentals.populated() == 0 {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(fundamentals)
}

fn parse_earnings(symbol: &str, body: &str) -> Result<Earnings, MarketDataError> {
    let items: Vec<EarningsItem> = http::parse_json(PROVIDER_ID, "earnings", body)?;
    let reports: Vec<EarningsReport> = items
        .into_iter()
        .filter_map(|item| {
            Some(EarningsReport {
                fiscal_date_ending: NaiveDate::parse_from_str(&item.period, "%Y-%m-%d").ok()?,
                reported_date: None,
                reported_eps: item.actual.and_then(decimal),
                estimated_eps: item.estimate.and_then(decimal),
                surprise: item.surprise.and_then(decimal),
                surprise_percent: item.surprise_percent.and_then(decimal),
            })
        })
        .collect();

    if reports.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(Earnings::new(symbol, reports, PROVIDER_ID))
}

// ============================================================================
// MarketDataProvider
// ============================================================================

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor::new(PROVIDER_ID)
            .priority(20)
            .kinds(&[
                DataKind::Quote,
                DataKind::CompanyInfo,
                DataKind::Fundamentals,
                DataKind::Earnings,
            ])
            .segments(&[Segment::UnitedStates])
            .rate_limit(60, None)
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        let body = self.fetch(symbol, "/quote", &[("symbol", ticker.as_str())]).await?;
        parse_quote(symbol, &body)
    }

    async fn get_company_info(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        let body = self
            .fetch(symbol, "/stock/profile2", &[("symbol", ticker.as_str())])
            .await?;
        parse_profile(symbol, &body)
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        let body = self
            .fetch(symbol, "/stock/metric", &[("symbol", ticker.as_str()), ("metric", "all")])
            .await?;
        parse_metrics(symbol, &body)
    }

    async fn get_earnings(&self, symbol: &str) -> Result<Earnings, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        let body = self
            .fetch(symbol, "/stock/earnings", &[("symbol", ticker.as_str())])
            .await?;
        parse_earnings(symbol, &body)
    }

    async fn health_check(&self) -> Result<(), MarketDataError> {
        self.get_quote("SPY").await.map(|_| ())
    }
}
