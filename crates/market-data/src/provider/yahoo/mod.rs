//! Yahoo Finance market data provider.
//!
//! Serves US, Hong Kong and Shanghai/Shenzhen listings:
//! - Quotes and bars from the v8 chart endpoint (no authentication)
//! - Option chains and expirations from the v7 options endpoint
//! - Company profile and valuation metrics from v10 quoteSummary
//!
//! The options and quoteSummary endpoints need a cookie/crumb pair, which is
//! fetched lazily and cached until Yahoo rejects it.

mod models;

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use reqwest::{header, Client};
use tracing::{debug, warn};
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{
    CompanyProfile, DataKind, Fundamentals, HistoryRange, OptionContract, OptionExpirations,
    OptionsChain, PriceBar, PriceSeries, Quote,
};
use crate::provider::http::{self, decimal};
use crate::provider::{AdapterDescriptor, MarketDataProvider};
use crate::segment::{self, ChinaExchange, Segment};

use models::{
    raw, YahooApiError, YahooChartResponse, YahooChartResult, YahooOptionContract,
    YahooOptionResult, YahooOptionsResponse, YahooQuoteSummaryResponse, YahooQuoteSummaryResult,
};

const PROVIDER_ID: &str = "YAHOO";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const OPTIONS_URL: &str = "https://query2.finance.yahoo.com/v7/finance/options";
const SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";

// ============================================================================
// Crumb/Cookie Authentication
// ============================================================================

/// Cached Yahoo authentication data
#[derive(Debug, Clone)]
struct CrumbData {
    cookie: String,
    crumb: String,
}

// ============================================================================
// Yahoo Provider
// ============================================================================

/// Yahoo Finance market data provider.
pub struct YahooProvider {
    client: Client,
    crumb: RwLock<Option<CrumbData>>,
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooProvider {
    pub fn new() -> Self {
        Self {
            client: http::build_client(Duration::from_secs(30)),
            crumb: RwLock::new(None),
        }
    }

    /// Yahoo's spelling of a symbol: `AAPL`, `0700.HK`, `600519.SS`.
    ///
    /// Beijing listings and non-equity segments have no Yahoo form.
    fn yahoo_symbol(symbol: &str) -> Option<String> {
        match segment::detect(symbol) {
            Segment::UnitedStates => Some(segment::us_ticker(symbol)),
            Segment::HongKong => segment::hk_code(symbol).map(|code| format!("{:04}.HK", code)),
            Segment::ChinaA => match segment::china_code(symbol)? {
                (ChinaExchange::Shanghai, code) => Some(format!("{}.SS", code)),
                (ChinaExchange::Shenzhen, code) => Some(format!("{}.SZ", code)),
                (ChinaExchange::Beijing, _) => None,
            },
            Segment::ChinaFutures | Segment::Economic => None,
        }
    }

    fn require_symbol(symbol: &str) -> Result<String, MarketDataError> {
        Self::yahoo_symbol(symbol).ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))
    }

    // ========================================================================
    // Crumb/Cookie Authentication
    // ========================================================================

    async fn ensure_crumb(&self) -> Result<CrumbData, MarketDataError> {
        {
            let guard = self.crumb.read().unwrap_or_else(|p| p.into_inner());
            if let Some(crumb) = guard.as_ref() {
                return Ok(crumb.clone());
            }
        }
        self.fetch_crumb().await
    }

    async fn fetch_crumb(&self) -> Result<CrumbData, MarketDataError> {
        // Step 1: cookie from fc.yahoo.com (the response status is irrelevant)
        let response = self.client.get(COOKIE_URL).send().await.map_err(|e| {
            MarketDataError::Transport {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to get cookie: {}", e),
            }
        })?;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(v, _)| v.to_string()))
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "Failed to parse Yahoo cookie"))?;

        // Step 2: crumb using the cookie
        let crumb = http::send(
            PROVIDER_ID,
            "crumb",
            self.client.get(CRUMB_URL).header(header::COOKIE, &cookie),
        )
        .await?;

        if crumb.is_empty() || crumb.contains('<') {
            return Err(MarketDataError::malformed(PROVIDER_ID, "Unexpected crumb body"));
        }

        let crumb_data = CrumbData { cookie, crumb };
        *self.crumb.write().unwrap_or_else(|p| p.into_inner()) = Some(crumb_data.clone());
        debug!("Yahoo crumb refreshed");
        Ok(crumb_data)
    }

    fn clear_crumb(&self) {
        *self.crumb.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// GET an endpoint that needs the crumb. A transport-level rejection drops the
    /// cached crumb so the next call re-authenticates.
    async fn get_authenticated(
        &self,
        symbol: &str,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<String, MarketDataError> {
        let crumb = self.ensure_crumb().await?;
        let request = self
            .client
            .get(url)
            .query(params)
            .query(&[("crumb", crumb.crumb.as_str())])
            .header(header::COOKIE, &crumb.cookie);

        let result = http::send(PROVIDER_ID, symbol, request).await;
        if let Err(MarketDataError::Transport { message, .. }) = &result {
            warn!("Yahoo authenticated request failed, dropping crumb: {}", message);
            self.clear_crumb();
        }
        result
    }

    async fn get_chart(
        &self,
        symbol: &str,
        params: &[(&str, String)],
    ) -> Result<String, MarketDataError> {
        let yahoo_symbol = Self::require_symbol(symbol)?;
        let url = format!("{}/{}", CHART_URL, encode(&yahoo_symbol));
        http::send(PROVIDER_ID, symbol, self.client.get(&url).query(params)).await
    }

    async fn get_summary(&self, symbol: &str, modules: &str) -> Result<String, MarketDataError> {
        let yahoo_symbol = Self::require_symbol(symbol)?;
        let url = format!("{}/{}", SUMMARY_URL, encode(&yahoo_symbol));
        self.get_authenticated(symbol, &url, &[("modules", modules.to_string())])
            .await
    }

    async fn get_options(
        &self,
        symbol: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<String, MarketDataError> {
        let yahoo_symbol = Self::require_symbol(symbol)?;
        let url = format!("{}/{}", OPTIONS_URL, encode(&yahoo_symbol));
        let params: Vec<(&str, String)> = expiry
            .map(|date| vec![("date", start_of_day(date).timestamp().to_string())])
            .unwrap_or_default();
        self.get_authenticated(symbol, &url, &params).await
    }
}

// ============================================================================
// Response mapping
// ============================================================================

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn date_from_unix(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

fn api_error(symbol: &str, error: Option<YahooApiError>) -> MarketDataError {
    match error {
        Some(YahooApiError {
            code: Some(code), ..
        }) if code.eq_ignore_ascii_case("Not Found") => MarketDataError::not_found(PROVIDER_ID, symbol),
        Some(YahooApiError { code, description }) => MarketDataError::malformed(
            PROVIDER_ID,
            format!(
                "{}: {}",
                code.unwrap_or_default(),
                description.unwrap_or_default()
            ),
        ),
        None => MarketDataError::not_found(PROVIDER_ID, symbol),
    }
}

fn chart_result(symbol: &str, body: &str) -> Result<YahooChartResult, MarketDataError> {
    let response: YahooChartResponse = http::parse_json(PROVIDER_ID, "chart", body)?;
    response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| api_error(symbol, response.chart.error))
}

pub(crate) fn parse_chart_quote(symbol: &str, body: &str) -> Result<Quote, MarketDataError> {
    let result = chart_result(symbol, body)?;
    let meta = result.meta;

    let price = meta
        .regular_market_price
        .and_then(decimal)
        .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

    let mut quote = Quote::new(symbol, price, PROVIDER_ID);
    quote.high = meta.regular_market_day_high.and_then(decimal);
    quote.low = meta.regular_market_day_low.and_then(decimal);
    quote.volume = meta.regular_market_volume.and_then(decimal);
    quote.previous_close = meta
        .previous_close
        .or(meta.chart_previous_close)
        .and_then(decimal);
    quote.open = result
        .indicators
        .as_ref()
        .and_then(|i| i.quote.first())
        .and_then(|q| q.open.last().copied().flatten())
        .and_then(decimal);
    quote.currency = meta.currency;
    if let Some(ts) = meta
        .regular_market_time
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    {
        quote.timestamp = ts;
    }
    Ok(quote.with_derived_change())
}

pub(crate) fn parse_chart_history(
    symbol: &str,
    range: &HistoryRange,
    body: &str,
) -> Result<PriceSeries, MarketDataError> {
    let result = chart_result(symbol, body)?;
    let arrays = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .unwrap_or_default();

    let value_at = |values: &Vec<Option<f64>>, i: usize| values.get(i).copied().flatten().and_then(decimal);

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(timestamp) = Utc.timestamp_opt(*ts, 0).single() else {
            warn!("Invalid Yahoo timestamp at index {}: {}", i, ts);
            continue;
        };
        // Bars without a close are non-trading placeholders
        let Some(close) = value_at(&arrays.close, i) else {
            continue;
        };
        bars.push(PriceBar {
            timestamp,
            open: value_at(&arrays.open, i),
            high: value_at(&arrays.high, i),
            low: value_at(&arrays.low, i),
            close,
            volume: value_at(&arrays.volume, i),
        });
    }

    let mut series = PriceSeries::new(symbol, range, bars, PROVIDER_ID);
    if series.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    series.currency = result.meta.currency;
    Ok(series)
}

fn option_result(symbol: &str, body: &str) -> Result<YahooOptionResult, MarketDataError> {
    let response: YahooOptionsResponse = http::parse_json(PROVIDER_ID, "options", body)?;
    let error = response.option_chain.error;
    response
        .option_chain
        .result
        .into_iter()
        .next()
        .ok_or_else(|| api_error(symbol, error))
}

fn map_contract(contract: YahooOptionContract) -> Option<OptionContract> {
    Some(OptionContract {
        contract_symbol: contract.contract_symbol,
        strike: decimal(contract.strike)?,
        last_price: contract.last_price.and_then(decimal),
        bid: contract.bid.and_then(decimal),
        ask: contract.ask.and_then(decimal),
        volume: contract.volume,
        open_interest: contract.open_interest,
        implied_volatility: contract.implied_volatility.and_then(decimal),
        in_the_money: contract.in_the_money,
    })
}

pub(crate) fn parse_options_chain(symbol: &str, body: &str) -> Result<OptionsChain, MarketDataError> {
    let result = option_result(symbol, body)?;
    let set = result
        .options
        .into_iter()
        .next()
        .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;
    let expiration = date_from_unix(set.expiration_date)
        .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "Invalid expiration date"))?;

    Ok(OptionsChain {
        underlying: symbol.to_string(),
        expiration,
        calls: set.calls.into_iter().filter_map(map_contract).collect(),
        puts: set.puts.into_iter().filter_map(map_contract).collect(),
        source: PROVIDER_ID.to_string(),
    })
}

pub(crate) fn parse_options_expirations(
    symbol: &str,
    body: &str,
) -> Result<OptionExpirations, MarketDataError> {
    let result = option_result(symbol, body)?;
    let mut dates: Vec<NaiveDate> = result
        .expiration_dates
        .into_iter()
        .filter_map(date_from_unix)
        .collect();
    dates.sort();
    dates.dedup();
    if dates.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(OptionExpirations {
        underlying: symbol.to_string(),
        dates,
        source: PROVIDER_ID.to_string(),
    })
}

fn summary_result(symbol: &str, body: &str) -> Result<YahooQuoteSummaryResult, MarketDataError> {
    let response: YahooQuoteSummaryResponse = http::parse_json(PROVIDER_ID, "quoteSummary", body)?;
    response
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| api_error(symbol, response.quote_summary.error))
}

pub(crate) fn parse_company_info(symbol: &str, body: &str) -> Result<CompanyProfile, MarketDataError> {
    let result = summary_result(symbol, body)?;
    let mut profile = CompanyProfile::new(PROVIDER_ID);

    if let Some(price) = result.price {
        profile.name = price.long_name.or(price.short_name);
        profile.exchange = price.exchange_name;
        profile.currency = price.currency;
    }
    if let Some(asset) = result.asset_profile {
        profile.sector = asset.sector;
        profile.industry = asset.industry;
        profile.website = asset.website;
        profile.description = asset.long_business_summary;
        profile.country = asset.country;
        profile.employees = asset.full_time_employees;
    }

    if profile.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(profile)
}

pub(crate) fn parse_fundamentals(symbol: &str, body: &str) -> Result<Fundamentals, MarketDataError> {
    let result = summary_result(symbol, body)?;
    let mut fundamentals = Fundamentals::new(symbol, PROVIDER_ID);

    if let Some(detail) = result.summary_detail {
        fundamentals.market_cap = raw(&detail.market_cap).and_then(decimal);
        fundamentals.pe_ratio = raw(&detail.trailing_pe).and_then(decimal);
        fundamentals.forward_pe = raw(&detail.forward_pe).and_then(decimal);
        fundamentals.dividend_yield = raw(&detail.dividend_yield).and_then(decimal);
        fundamentals.beta = raw(&detail.beta).and_then(decimal);
        fundamentals.week52_high = raw(&detail.fifty_two_week_high).and_then(decimal);
        fundamentals.week52_low = raw(&detail.fifty_two_week_low).and_then(decimal);
    }
    if let Some(stats) = result.default_key_statistics {
        fundamentals.pb_ratio = raw(&stats.price_to_book).and_then(decimal);
        fundamentals.eps = raw(&stats.trailing_eps).and_then(decimal);
        fundamentals.shares_outstanding = raw(&stats.shares_outstanding).and_then(decimal);
    }
    if let Some(financials) = result.financial_data {
        fundamentals.revenue_ttm = raw(&financials.total_revenue).and_then(decimal);
        fundamentals.profit_margin = raw(&financials.profit_margins).and_then(decimal);
        fundamentals.return_on_equity = raw(&financials.return_on_equity).and_then(decimal);
    }

    if fundamentals.populated() == 0 {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(fundamentals)
}

// ============================================================================
// MarketDataProvider
// ============================================================================

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor::new(PROVIDER_ID)
            .priority(10)
            .kinds(&[
                DataKind::Quote,
                DataKind::History,
                DataKind::CompanyInfo,
                DataKind::Fundamentals,
                DataKind::OptionsChain,
                DataKind::OptionsExpirations,
            ])
            .segments(&[Segment::UnitedStates, Segment::HongKong, Segment::ChinaA])
            .rate_limit(100, None)
    }

    fn supports_symbol(&self, symbol: &str) -> bool {
        Self::yahoo_symbol(symbol).is_some()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let params = [("range", "1d".to_string()), ("interval", "1d".to_string())];
        let body = self.get_chart(symbol, &params).await?;
        parse_chart_quote(symbol, &body)
    }

    async fn get_history(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<PriceSeries, MarketDataError> {
        let params = [
            ("period1", start_of_day(range.start).timestamp().to_string()),
            (
                "period2",
                start_of_day(range.end + chrono::Duration::days(1))
                    .timestamp()
                    .to_string(),
            ),
            ("interval", range.interval.as_str().to_string()),
            ("events", "history".to_string()),
        ];
        let body = self.get_chart(symbol, &params).await?;
        parse_chart_history(symbol, range, &body)
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let body = self
            .get_summary(symbol, "summaryDetail,defaultKeyStatistics,financialData")
            .await?;
        parse_fundamentals(symbol, &body)
    }

    async fn get_company_info(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        let body = self.get_summary(symbol, "assetProfile,price").await?;
        parse_company_info(symbol, &body)
    }

    async fn get_options_chain(
        &self,
        symbol: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<OptionsChain, MarketDataError> {
        let body = self.get_options(symbol, expiry).await?;
        parse_options_chain(symbol, &body)
    }

    async fn get_options_expirations(
        &self,
        symbol: &str,
    ) -> Result<OptionExpirations, MarketDataError> {
        let body = self.get_options(symbol, None).await?;
        parse_options_expirations(symbol, &body)
    }

    async fn health_check(&self) -> Result<(), MarketDataError> {
        self.get_quote("SPY").await.map(|_| ())
    }
}
