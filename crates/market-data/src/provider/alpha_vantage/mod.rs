//! Alpha Vantage market data provider implementation.
//!
//! This module provides market data from Alpha Vantage API:
//! - Quotes via GLOBAL_QUOTE
//! - Daily, weekly and monthly bars via TIME_SERIES_*
//! - Fundamentals and company info via OVERVIEW
//! - Earnings via EARNINGS
//! - US macro indicators (CPI, REAL_GDP, ...) via the economic endpoints
//!
//! Note: Alpha Vantage free tier is limited to 5 API calls per minute and 25
//! per day. A quota breach is reported inside a 200 response as a "Note" or
//! "Information" body, which is mapped to `RateLimited`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{
    CompanyProfile, DataKind, Earnings, EarningsReport, Fundamentals, HistoryRange, Interval,
    MacroObservation, MacroSeries, PriceBar, PriceSeries, Quote,
};
use crate::provider::http::{self, decimal_str};
use crate::provider::{AdapterDescriptor, MarketDataProvider};
use crate::segment::{self, Segment};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";

/// Indicator name -> (function, extra params)
const MACRO_FUNCTIONS: &[(&str, &str, &[(&str, &str)])] = &[
    ("CPI", "CPI", &[("interval", "monthly")]),
    ("INFLATION", "INFLATION", &[]),
    ("REAL_GDP", "REAL_GDP", &[("interval", "quarterly")]),
    ("REAL_GDP_PER_CAPITA", "REAL_GDP_PER_CAPITA", &[]),
    ("FEDERAL_FUNDS_RATE", "FEDERAL_FUNDS_RATE", &[("interval", "monthly")]),
    ("TREASURY_YIELD", "TREASURY_YIELD", &[("interval", "monthly"), ("maturity", "10year")]),
    ("UNEMPLOYMENT", "UNEMPLOYMENT", &[]),
    ("RETAIL_SALES", "RETAIL_SALES", &[]),
    ("DURABLES", "DURABLES", &[]),
    ("NONFARM_PAYROLL", "NONFARM_PAYROLL", &[]),
];

/// Alpha Vantage market data provider.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

// ============================================================================
// Response structures for Alpha Vantage API
// ============================================================================

/// Keys Alpha Vantage uses to report problems inside a 200 response
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    global_quote: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(
        rename = "Time Series (Daily)",
        alias = "Weekly Time Series",
        alias = "Monthly Time Series"
    )]
    time_series: Option<HashMap<String, HashMap<String, String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OverviewResponse {
    name: Option<String>,
    description: Option<String>,
    exchange: Option<String>,
    currency: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    official_site: Option<String>,
    market_capitalization: Option<String>,
    #[serde(rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(rename = "ForwardPE")]
    forward_pe: Option<String>,
    price_to_book_ratio: Option<String>,
    #[serde(rename = "EPS")]
    eps: Option<String>,
    dividend_yield: Option<String>,
    beta: Option<String>,
    #[serde(rename = "RevenueTTM")]
    revenue_ttm: Option<String>,
    profit_margin: Option<String>,
    #[serde(rename = "ReturnOnEquityTTM")]
    return_on_equity_ttm: Option<String>,
    #[serde(rename = "52WeekHigh")]
    week52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    week52_low: Option<String>,
    shares_outstanding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EarningsResponse {
    #[serde(default)]
    quarterly_earnings: Vec<QuarterlyEarning>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuarterlyEarning {
    fiscal_date_ending: String,
    reported_date: Option<String>,
    #[serde(rename = "reportedEPS")]
    reported_eps: Option<String>,
    #[serde(rename = "estimatedEPS")]
    estimated_eps: Option<String>,
    surprise: Option<String>,
    surprise_percentage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MacroResponse {
    unit: Option<String>,
    #[serde(default)]
    data: Vec<MacroPoint>,
}

#[derive(Debug, Deserialize)]
struct MacroPoint {
    date: String,
    value: String,
}

// ============================================================================
// AlphaVantageProvider
// ============================================================================

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: http::build_client(Duration::from_secs(30)),
            api_key,
        }
    }

    /// Make a request to the Alpha Vantage API and screen the envelope.
    async fn fetch(&self, symbol: &str, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(BASE_URL, &all_params).map_err(|e| {
            MarketDataError::Configuration(format!("Failed to build Alpha Vantage URL: {}", e))
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let body = http::send(PROVIDER_ID, symbol, self.client.get(url)).await?;
        check_envelope(symbol, &body)?;
        Ok(body)
    }
}

/// Map the in-band error keys onto the error taxonomy.
fn check_envelope(symbol: &str, body: &str) -> Result<(), MarketDataError> {
    // Arrays and other shapes carry no envelope
    let Ok(envelope) = serde_json::from_str::<ApiEnvelope>(body) else {
        return Ok(());
    };

    if let Some(msg) = envelope.note.or(envelope.information) {
        warn!("Alpha Vantage quota signal: {}", msg);
        return Err(MarketDataError::RateLimited {
            provider: PROVIDER_ID.to_string(),
            retry_after: None,
        });
    }

    if let Some(msg) = envelope.error_message {
        debug!("Alpha Vantage error for {}: {}", symbol, msg);
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }

    Ok(())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn field<'a>(map: &'a HashMap<String, String>, suffix: &str) -> Option<&'a str> {
    // keys are numbered ("05. price"); match on the name part
    map.iter()
        .find(|(k, _)| k.split_once(". ").map(|(_, name)| name) == Some(suffix))
        .map(|(_, v)| v.as_str())
}

fn opt_decimal(value: &Option<String>) -> Option<Decimal> {
    value.as_deref().and_then(decimal_str)
}

fn parse_global_quote(symbol: &str, body: &str) -> Result<Quote, MarketDataError> {
    let response: GlobalQuoteResponse = http::parse_json(PROVIDER_ID, "GLOBAL_QUOTE", body)?;
    let q = &response.global_quote;

    let price = field(q, "price")
        .and_then(decimal_str)
        .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

    let mut quote = Quote::new(symbol, price, PROVIDER_ID);
    quote.open = field(q, "open").and_then(decimal_str);
    quote.high = field(q, "high").and_then(decimal_str);
    quote.low = field(q, "low").and_then(decimal_str);
    quote.volume = field(q, "volume").and_then(decimal_str);
    quote.previous_close = field(q, "previous close").and_then(decimal_str);
    quote.change = field(q, "change").and_then(decimal_str);
    quote.change_percent = field(q, "change percent").and_then(decimal_str);
    quote.currency = Some("USD".to_string());
    if let Some(ts) = field(q, "latest trading day")
        .and_then(parse_date)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
    {
        quote.timestamp = ts;
    }
    Ok(quote.with_derived_change())
}

fn parse_time_series(
    symbol: &str,
    range: &HistoryRange,
    body: &str,
) -> Result<PriceSeries, MarketDataError> {
    let response: TimeSeriesResponse = http::parse_json(PROVIDER_ID, "TIME_SERIES", body)?;
    let series = response
        .time_series
        .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

    let bars = series
        .iter()
        .filter_map(|(date, values)| {
            let timestamp = Utc.from_utc_datetime(&parse_date(date)?.and_hms_opt(0, 0, 0)?);
            Some(PriceBar {
                timestamp,
                open: field(values, "open").and_then(decimal_str),
                high: field(values, "high").and_then(decimal_str),
                low: field(values, "low").and_then(decimal_str),
                close: field(values, "close").and_then(decimal_str)?,
                volume: field(values, "volume").and_then(decimal_str),
            })
        })
        .collect();

    let mut series = PriceSeries::new(symbol, range, bars, PROVIDER_ID);
    if series.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    series.currency = Some("USD".to_string());
    Ok(series)
}

fn parse_overview(body: &str) -> Result<OverviewResponse, MarketDataError> {
    // An unknown symbol yields `{}`
    http::parse_json(PROVIDER_ID, "OVERVIEW", body)
}

fn overview_to_profile(symbol: &str, overview: OverviewResponse) -> Result<CompanyProfile, MarketDataError> {
    let profile = CompanyProfile {
        source: PROVIDER_ID.to_string(),
        name: overview.name,
        exchange: overview.exchange,
        sector: overview.sector,
        industry: overview.industry,
        country: overview.country,
        currency: overview.currency,
        website: overview.official_site.filter(|s| s != "None"),
        description: overview.description,
        employees: None,
        logo_url: None,
    };
    if profile.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(profile)
}

fn overview_to_fundamentals(
    symbol: &str,
    overview: &OverviewResponse,
) -> Result<Fundamentals, MarketDataError> {
    let mut fundamentals = Fundamentals::new(symbol, PROVIDER_ID);
    fundamentals.market_cap = opt_decimal(&overview.market_capitalization);
    fundamentals.pe_ratio = opt_decimal(&overview.pe_ratio);
    fundamentals.forward_pe = opt_decimal(&overview.forward_pe);
    fundamentals.pb_ratio = opt_decimal(&overview.price_to_book_ratio);
    fundamentals.eps = opt_decimal(&overview.eps);
    fundamentals.dividend_yield = opt_decimal(&overview.dividend_yield);
    fundamentals.beta = opt_decimal(&overview.beta);
    fundamentals.revenue_ttm = opt_decimal(&overview.revenue_ttm);
    fundamentals.profit_margin = opt_decimal(&overview.profit_margin);
    fundamentals.return_on_equity = opt_decimal(&overview.return_on_equity_ttm);
    fundamentals.week52_high = opt_decimal(&overview.week52_high);
    fundamentals.week52_low = opt_decimal(&overview.week52_low);
    fundamentals.shares_outstanding = opt_decimal(&overview.shares_outstanding);

    if fundamentals.populated() == 0 {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(fundamentals)
}

fn parse_earnings(symbol: &str, body: &str) -> Result<Earnings, MarketDataError> {
    let response: EarningsResponse = http::parse_json(PROVIDER_ID, "EARNINGS", body)?;
    let reports: Vec<EarningsReport> = response
        .quarterly_earnings
        .into_iter()
        .filter_map(|q| {
            Some(EarningsReport {
                fiscal_date_ending: parse_date(&q.fiscal_date_ending)?,
                reported_date: q.reported_date.as_deref().and_then(parse_date),
                reported_eps: opt_decimal(&q.reported_eps),
                estimated_eps: opt_decimal(&q.estimated_eps),
                surprise: opt_decimal(&q.surprise),
                surprise_percent: opt_decimal(&q.surprise_percentage),
            })
        })
        .collect();

    if reports.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(Earnings::new(symbol, reports, PROVIDER_ID))
}

fn parse_macro(indicator: &str, body: &str) -> Result<MacroSeries, MarketDataError> {
    let response: MacroResponse = http::parse_json(PROVIDER_ID, "economic indicator", body)?;
    // "." marks a missing observation
    let mut observations: Vec<MacroObservation> = response
        .data
        .iter()
        .filter_map(|point| {
            Some(MacroObservation {
                date: parse_date(&point.date)?,
                value: decimal_str(&point.value)?,
            })
        })
        .collect();
    observations.sort_by(|a, b| a.date.cmp(&b.date));

    if observations.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, indicator));
    }
    Ok(MacroSeries {
        indicator: indicator.to_string(),
        unit: response.unit,
        observations,
        source: PROVIDER_ID.to_string(),
    })
}

fn history_function(interval: Interval) -> &'static str {
    match interval {
        Interval::Daily => "TIME_SERIES_DAILY",
        Interval::Weekly => "TIME_SERIES_WEEKLY",
        Interval::Monthly => "TIME_SERIES_MONTHLY",
    }
}

// ============================================================================
// MarketDataProvider
// ============================================================================

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor::new(PROVIDER_ID)
            .priority(30)
            .kinds(&[
                DataKind::Quote,
                DataKind::History,
                DataKind::Fundamentals,
                DataKind::CompanyInfo,
                DataKind::Earnings,
                DataKind::MacroIndicator,
            ])
            .segments(&[Segment::UnitedStates, Segment::Economic])
            .rate_limit(5, Some(25))
            // The daily quota is tiny; keep quotes around longer than usual
            .ttl_override(DataKind::Quote, Duration::from_secs(5 * 60))
            .request_timeout(Duration::from_secs(15))
    }

    fn supports_symbol(&self, symbol: &str) -> bool {
        match segment::detect(symbol) {
            Segment::Economic => {
                let name = symbol.trim_start_matches(crate::models::MACRO_SYMBOL_PREFIX);
                MACRO_FUNCTIONS.iter().any(|(n, _, _)| *n == name)
            }
            _ => true,
        }
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        let body = self
            .fetch(symbol, &[("function", "GLOBAL_QUOTE"), ("symbol", ticker.as_str())])
            .await?;
        parse_global_quote(symbol, &body)
    }

    async fn get_history(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<PriceSeries, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        // compact covers the last 100 points
        let days = (Utc::now().date_naive() - range.start).num_days();
        let output_size = if days > 100 { "full" } else { "compact" };
        let body = self
            .fetch(
                symbol,
                &[
                    ("function", history_function(range.interval)),
                    ("symbol", ticker.as_str()),
                    ("outputsize", output_size),
                ],
            )
            .await?;
        parse_time_series(symbol, range, &body)
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        let body = self
            .fetch(symbol, &[("function", "OVERVIEW"), ("symbol", ticker.as_str())])
            .await?;
        overview_to_fundamentals(symbol, &parse_overview(&body)?)
    }

    async fn get_company_info(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        let body = self
            .fetch(symbol, &[("function", "OVERVIEW"), ("symbol", ticker.as_str())])
            .await?;
        overview_to_profile(symbol, parse_overview(&body)?)
    }

    async fn get_earnings(&self, symbol: &str) -> Result<Earnings, MarketDataError> {
        let ticker = segment::us_ticker(symbol);
        let body = self
            .fetch(symbol, &[("function", "EARNINGS"), ("symbol", ticker.as_str())])
            .await?;
        parse_earnings(symbol, &body)
    }

    async fn get_macro_indicator(&self, indicator: &str) -> Result<MacroSeries, MarketDataError> {
        let (_, function, extra) = MACRO_FUNCTIONS
            .iter()
            .find(|(name, _, _)| *name == indicator)
            .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, indicator))?;

        let mut params: Vec<(&str, &str)> = vec![("function", *function)];
        params.extend_from_slice(extra);
        let body = self.fetch(indicator, &params).await?;
        parse_macro(indicator, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_descriptor() {
        let descriptor = AlphaVantageProvider::new("test_key".to_string()).descriptor();
        assert_eq!(descriptor.name, "ALPHA_VANTAGE");
        assert_eq!(descriptor.rate_limit.requests_per_minute, 5);
        assert_eq!(descriptor.rate_limit.requests_per_day, Some(25));
        assert!(descriptor.supports_segment(Segment::Economic));
        assert!(descriptor.ttl_overrides.contains_key(&DataKind::Quote));
    }

    #[test]
    fn test_supports_known_macro_indicators_only() {
        let provider = AlphaVantageProvider::new("test_key".to_string());
        assert!(provider.supports_symbol("ECON:CPI"));
        assert!(!provider.supports_symbol("ECON:PMI"));
        assert!(provider.supports_symbol("AAPL"));
    }

    #[test]
    fn test_note_is_rate_limited() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        let err = check_envelope("AAPL", body).unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimited { .. }));

        let body = r#"{"Information": "We have detected your API key and our standard API rate limit is 25 requests per day."}"#;
        let err = check_envelope("AAPL", body).unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimited { .. }));
    }

    #[test]
    fn test_error_message_is_not_found() {
        let body = r#"{"Error Message": "Invalid API call. Please retry or visit the documentation."}"#;
        let err = check_envelope("ZZZZ", body).unwrap_err();
        assert!(matches!(err, MarketDataError::NotFound { .. }));
    }

    #[test]
    fn test_envelope_ignores_arrays() {
        assert!(check_envelope("AAPL", "[1, 2]").is_ok());
        assert!(check_envelope("AAPL", r#"{"Global Quote": {}}"#).is_ok());
    }

    #[test]
    fn test_global_quote_parsing() {
        let body = r#"{
            "Global Quote": {
                "01. symbol": "IBM",
                "02. open": "187.0300",
                "03. high": "188.4400",
                "04. low": "185.6100",
                "05. price": "187.5000",
                "06. volume": "3924418",
                "07. latest trading day": "2024-01-05",
                "08. previous close": "186.8600",
                "09. change": "0.6400",
                "10. change percent": "0.3425%"
            }
        }"#;
        let quote = parse_global_quote("IBM", body).unwrap();
        assert_eq!(quote.price, dec!(187.5));
        assert_eq!(quote.change_percent, Some(dec!(0.3425)));
        assert_eq!(quote.volume, Some(dec!(3924418)));
        assert_eq!(quote.timestamp.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn test_empty_global_quote_is_not_found() {
        let err = parse_global_quote("ZZZZ", r#"{"Global Quote": {}}"#).unwrap_err();
        assert!(matches!(err, MarketDataError::NotFound { .. }));
    }

    #[test]
    fn test_time_series_parsing_filters_range() {
        let body = r#"{
            "Meta Data": {"2. Symbol": "IBM"},
            "Time Series (Daily)": {
                "2024-01-05": {"1. open": "187.03", "2. high": "188.44", "3. low": "185.61", "4. close": "187.50", "5. volume": "3924418"},
                "2024-01-04": {"1. open": "186.00", "2. high": "187.00", "3. low": "185.00", "4. close": "186.86", "5. volume": "3000000"},
                "2023-12-29": {"1. open": "163.00", "2. high": "164.00", "3. low": "162.00", "4. close": "163.55", "5. volume": "2000000"}
            }
        }"#;
        let range = HistoryRange::daily(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let series = parse_time_series("IBM", &range, body).unwrap();
        assert_eq!(series.bars.len(), 2);
        assert_eq!(series.bars[0].close, dec!(186.86));
        assert_eq!(series.last_close(), Some(dec!(187.50)));
    }

    #[test]
    fn test_weekly_series_key_is_accepted() {
        let body = r#"{"Weekly Time Series": {"2024-01-05": {"1. open": "1", "2. high": "2", "3. low": "0.5", "4. close": "1.5", "5. volume": "10"}}}"#;
        let range = HistoryRange::last_days(100_000).with_interval(Interval::Weekly);
        let series = parse_time_series("IBM", &range, body).unwrap();
        assert_eq!(series.bars.len(), 1);
    }

    #[test]
    fn test_overview_parsing() {
        let body = r#"{
            "Symbol": "IBM",
            "Name": "International Business Machines",
            "Description": "IBM is an American multinational technology company.",
            "Exchange": "NYSE",
            "Currency": "USD",
            "Country": "USA",
            "Sector": "TECHNOLOGY",
            "Industry": "COMPUTER & OFFICE EQUIPMENT",
            "OfficialSite": "None",
            "MarketCapitalization": "170000000000",
            "PERatio": "22.5",
            "ForwardPE": "-",
            "DividendYield": "0.0354",
            "52WeekHigh": "199.18",
            "52WeekLow": "120.55"
        }"#;
        let overview = parse_overview(body).unwrap();
        let fundamentals = overview_to_fundamentals("IBM", &overview).unwrap();
        assert_eq!(fundamentals.pe_ratio, Some(dec!(22.5)));
        assert_eq!(fundamentals.forward_pe, None);
        assert_eq!(fundamentals.dividend_yield, Some(dec!(0.0354)));

        let profile = overview_to_profile("IBM", overview).unwrap();
        assert_eq!(profile.exchange.as_deref(), Some("NYSE"));
        assert!(profile.website.is_none());
    }

    #[test]
    fn test_empty_overview_is_not_found() {
        let overview = parse_overview("{}").unwrap();
        assert!(overview_to_fundamentals("ZZZZ", &overview).is_err());
        assert!(overview_to_profile("ZZZZ", overview).is_err());
    }

    #[test]
    fn test_earnings_parsing() {
        let body = r#"{
            "symbol": "IBM",
            "annualEarnings": [],
            "quarterlyEarnings": [
                {"fiscalDateEnding": "2023-09-30", "reportedDate": "2023-10-25", "reportedEPS": "2.2", "estimatedEPS": "2.13", "surprise": "0.07", "surprisePercentage": "3.2864"},
                {"fiscalDateEnding": "2023-12-31", "reportedDate": "2024-01-24", "reportedEPS": "3.87", "estimatedEPS": "3.78", "surprise": "0.09", "surprisePercentage": "2.381"}
            ]
        }"#;
        let earnings = parse_earnings("IBM", body).unwrap();
        let latest = earnings.latest().unwrap();
        assert_eq!(latest.reported_eps, Some(dec!(3.87)));
        assert_eq!(latest.reported_date, NaiveDate::from_ymd_opt(2024, 1, 24));
    }

    #[test]
    fn test_macro_parsing_skips_missing_values() {
        let body = r#"{
            "name": "Consumer Price Index for all Urban Consumers",
            "interval": "monthly",
            "unit": "index 1982-1984=100",
            "data": [
                {"date": "2024-02-01", "value": "."},
                {"date": "2024-01-01", "value": "308.417"},
                {"date": "2023-12-01", "value": "306.746"}
            ]
        }"#;
        let series = parse_macro("CPI", body).unwrap();
        assert_eq!(series.observations.len(), 2);
        assert_eq!(series.latest().map(|o| o.value), Some(dec!(308.417)));
        assert_eq!(series.unit.as_deref(), Some("index 1982-1984=100"));
    }
}
