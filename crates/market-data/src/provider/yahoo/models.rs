//! Yahoo Finance API response models.
//!
//! Three endpoint families are parsed here: v8 `chart` (quotes and bars),
//! v7 `options` (chains and expirations) and v10 `quoteSummary`
//! (company profile and valuation metrics).

use serde::Deserialize;

// ============================================================================
// v8 chart
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct YahooChartResponse {
    pub chart: YahooChart,
}

#[derive(Debug, Deserialize)]
pub struct YahooChart {
    pub result: Option<Vec<YahooChartResult>>,
    pub error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
pub struct YahooApiError {
    pub code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct YahooChartResult {
    pub meta: YahooChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Option<YahooIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooChartMeta {
    pub currency: Option<String>,
    pub symbol: Option<String>,
    pub regular_market_price: Option<f64>,
    pub regular_market_time: Option<i64>,
    pub regular_market_day_high: Option<f64>,
    pub regular_market_day_low: Option<f64>,
    pub regular_market_volume: Option<f64>,
    pub chart_previous_close: Option<f64>,
    pub previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct YahooIndicators {
    #[serde(default)]
    pub quote: Vec<YahooBarArrays>,
}

/// Parallel arrays; Yahoo emits `null` for bars with no trade.
#[derive(Debug, Default, Deserialize)]
pub struct YahooBarArrays {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

// ============================================================================
// v7 options
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooOptionsResponse {
    pub option_chain: YahooOptionChain,
}

#[derive(Debug, Deserialize)]
pub struct YahooOptionChain {
    #[serde(default)]
    pub result: Vec<YahooOptionResult>,
    pub error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooOptionResult {
    pub underlying_symbol: Option<String>,
    #[serde(default)]
    pub expiration_dates: Vec<i64>,
    #[serde(default)]
    pub options: Vec<YahooOptionSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooOptionSet {
    pub expiration_date: i64,
    #[serde(default)]
    pub calls: Vec<YahooOptionContract>,
    #[serde(default)]
    pub puts: Vec<YahooOptionContract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooOptionContract {
    pub contract_symbol: String,
    pub strike: f64,
    pub last_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume: Option<u64>,
    pub open_interest: Option<u64>,
    pub implied_volatility: Option<f64>,
    #[serde(default)]
    pub in_the_money: bool,
}

// ============================================================================
// v10 quoteSummary
// ============================================================================

/// Main response wrapper for quoteSummary API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResponse {
    pub quote_summary: YahooQuoteSummary,
}

/// Quote summary container
#[derive(Debug, Deserialize)]
pub struct YahooQuoteSummary {
    pub result: Option<Vec<YahooQuoteSummaryResult>>,
    pub error: Option<YahooApiError>,
}

/// Individual result from quoteSummary API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResult {
    pub price: Option<YahooPriceData>,
    pub asset_profile: Option<YahooAssetProfile>,
    pub summary_detail: Option<YahooSummaryDetail>,
    pub default_key_statistics: Option<YahooKeyStatistics>,
    pub financial_data: Option<YahooFinancialData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooPriceData {
    pub currency: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub exchange_name: Option<String>,
}

/// Value with raw and formatted forms. Yahoo sends `{}` when there is no data.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct YahooValue {
    pub raw: Option<f64>,
}

/// Company info
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooAssetProfile {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub long_business_summary: Option<String>,
    pub country: Option<String>,
    pub full_time_employees: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooSummaryDetail {
    pub market_cap: Option<YahooValue>,
    #[serde(rename = "trailingPE")]
    pub trailing_pe: Option<YahooValue>,
    #[serde(rename = "forwardPE")]
    pub forward_pe: Option<YahooValue>,
    pub dividend_yield: Option<YahooValue>,
    pub beta: Option<YahooValue>,
    pub fifty_two_week_high: Option<YahooValue>,
    pub fifty_two_week_low: Option<YahooValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooKeyStatistics {
    pub price_to_book: Option<YahooValue>,
    pub trailing_eps: Option<YahooValue>,
    pub shares_outstanding: Option<YahooValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooFinancialData {
    pub total_revenue: Option<YahooValue>,
    pub profit_margins: Option<YahooValue>,
    pub return_on_equity: Option<YahooValue>,
}

pub(crate) fn raw(value: &Option<YahooValue>) -> Option<f64> {
    value.as_ref().and_then(|v| v.raw)
}
