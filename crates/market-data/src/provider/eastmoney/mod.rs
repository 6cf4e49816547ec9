//! Eastmoney provider for Shanghai, Shenzhen and Beijing listings.
//!
//! - Quotes via push2 `qt/stock/get`
//! - Daily, weekly and monthly bars via push2his `qt/stock/kline/get`
//!
//! Eastmoney addresses an instrument by `secid`, a market number plus the
//! six digit code: `1.600519` for Shanghai, `0.000001` for Shenzhen and Beijing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{DataKind, HistoryRange, Interval, PriceBar, PriceSeries, Quote};
use crate::provider::http::{self, decimal, decimal_str};
use crate::provider::{AdapterDescriptor, MarketDataProvider};
use crate::segment::{self, ChinaExchange, Segment};

const PROVIDER_ID: &str = "EASTMONEY";
const QUOTE_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const QUOTE_FIELDS: &str = "f43,f44,f45,f46,f47,f57,f58,f60,f86,f169,f170";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    data: Option<QuoteData>,
}

/// Numeric fields arrive as numbers, or as "-" when the instrument is suspended.
#[derive(Debug, Deserialize)]
struct QuoteData {
    /// Last price
    f43: Option<Value>,
    /// High
    f44: Option<Value>,
    /// Low
    f45: Option<Value>,
    /// Open
    f46: Option<Value>,
    /// Volume in lots of 100 shares
    f47: Option<Value>,
    /// Previous close
    f60: Option<Value>,
    /// Quote time (Unix seconds)
    f86: Option<i64>,
    /// Change
    f169: Option<Value>,
    /// Change percent
    f170: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    /// "date,open,close,high,low,volume,..." rows
    #[serde(default)]
    klines: Vec<String>,
}

// ============================================================================
// EastmoneyProvider
// ============================================================================

pub struct EastmoneyProvider {
    client: Client,
}

impl Default for EastmoneyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EastmoneyProvider {
    pub fn new() -> Self {
        Self {
            client: http::build_client(Duration::from_secs(15)),
        }
    }

    fn secid(symbol: &str) -> Result<String, MarketDataError> {
        let (exchange, code) =
            segment::china_code(symbol).ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;
        let market = match exchange {
            ChinaExchange::Shanghai => 1,
            ChinaExchange::Shenzhen | ChinaExchange::Beijing => 0,
        };
        Ok(format!("{}.{}", market, code))
    }
}

fn value_decimal(value: &Option<Value>) -> Option<Decimal> {
    match value.as_ref()? {
        Value::Number(n) => n.as_f64().and_then(decimal),
        Value::String(s) => decimal_str(s),
        _ => None,
    }
}

fn parse_quote(symbol: &str, body: &str) -> Result<Quote, MarketDataError> {
    let response: QuoteResponse = http::parse_json(PROVIDER_ID, "quote", body)?;
    let data = response
        .data
        .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

    let price = value_decimal(&data.f43).ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

    let mut quote = Quote::new(symbol, price, PROVIDER_ID);
    quote.high = value_decimal(&data.f44);
    quote.low = value_decimal(&data.f45);
    quote.open = value_decimal(&data.f46);
    quote.volume = value_decimal(&data.f47).map(|lots| lots * Decimal::ONE_HUNDRED);
    quote.previous_close = value_decimal(&data.f60);
    quote.change = value_decimal(&data.f169);
    quote.change_percent = value_decimal(&data.f170);
    quote.currency = Some("CNY".to_string());
    if let Some(ts) = data.f86.and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
        quote.timestamp = ts;
    }
    Ok(quote.with_derived_change())
}

fn parse_kline_row(row: &str) -> Option<PriceBar> {
    let mut cols = row.split(',');
    let date = NaiveDate::parse_from_str(cols.next()?, "%Y-%m-%d").ok()?;
    let open = cols.next().and_then(decimal_str);
    let close = cols.next().and_then(decimal_str)?;
    let high = cols.next().and_then(decimal_str);
    let low = cols.next().and_then(decimal_str);
    let volume = cols
        .next()
        .and_then(decimal_str)
        .map(|lots| lots * Decimal::ONE_HUNDRED);
    Some(PriceBar {
        timestamp: Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?),
        open,
        high,
        low,
        close,
        volume,
    })
}

fn parse_klines(symbol: &str, range: &HistoryRange, body: &str) -> Result<PriceSeries, MarketDataError> {
    let response: KlineResponse = http::parse_json(PROVIDER_ID, "kline", body)?;
    let data = response
        .data
        .ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))?;

    let bars: Vec<PriceBar> = data.klines.iter().filter_map(|row| parse_kline_row(row)).collect();
    if bars.len() != data.klines.len() {
        debug!(
            "Eastmoney dropped {} unparseable kline rows for {}",
            data.klines.len() - bars.len(),
            symbol
        );
    }

    let mut series = PriceSeries::new(symbol, range, bars, PROVIDER_ID);
    if series.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    series.currency = Some("CNY".to_string());
    Ok(series)
}

fn kline_type(interval: Interval) -> &'static str {
    match interval {
        Interval::Daily => "101",
        Interval::Weekly => "102",
        Interval::Monthly => "103",
    }
}

// ============================================================================
// MarketDataProvider
// ============================================================================

#[async_trait]
impl MarketDataProvider for EastmoneyProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor::new(PROVIDER_ID)
            .priority(5)
            .kinds(&[DataKind::Quote, DataKind::History])
            .segments(&[Segment::ChinaA])
            .rate_limit(120, None)
            .request_timeout(Duration::from_secs(8))
    }

    fn supports_symbol(&self, symbol: &str) -> bool {
        segment::china_code(symbol).is_some()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let secid = Self::secid(symbol)?;
        let request = self.client.get(QUOTE_URL).query(&[
            ("secid", secid.as_str()),
            ("fields", QUOTE_FIELDS),
            ("fltt", "2"),
        ]);
        let body = http::send(PROVIDER_ID, symbol, request).await?;
        parse_quote(symbol, &body)
    }

    async fn get_history(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<PriceSeries, MarketDataError> {
        let secid = Self::secid(symbol)?;
        let beg = range.start.format("%Y%m%d").to_string();
        let end = range.end.format("%Y%m%d").to_string();
        let request = self.client.get(KLINE_URL).query(&[
            ("secid", secid.as_str()),
            ("fields1", "f1,f2,f3,f4,f5,f6"),
            ("fields2", "f51,f52,f53,f54,f55,f56"),
            ("klt", kline_type(range.interval)),
            // forward-adjusted prices
            ("fqt", "1"),
            ("beg", beg.as_str()),
            ("end", end.as_str()),
        ]);
        let body = http::send(PROVIDER_ID, symbol, request).await?;
        parse_klines(symbol, range, &body)
    }

    async fn health_check(&self) -> Result<(), MarketDataError> {
        self.get_quote("600000").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_secid() {
        assert_eq!(EastmoneyProvider::secid("600519").unwrap(), "1.600519");
        assert_eq!(EastmoneyProvider::secid("000001.SZ").unwrap(), "0.000001");
        assert_eq!(EastmoneyProvider::secid("BJ830799").unwrap(), "0.830799");
        assert!(EastmoneyProvider::secid("AAPL").is_err());
    }

    #[test]
    fn test_quote_parsing() {
        let body = r#"{
            "rc": 0,
            "data": {
                "f43": 1688.0, "f44": 1700.5, "f45": 1680.0, "f46": 1690.0,
                "f47": 32153, "f57": "600519", "f58": "贵州茅台", "f60": 1675.0,
                "f86": 1704438000, "f169": 13.0, "f170": 0.78
            }
        }"#;
        let quote = parse_quote("600519", body).unwrap();
        assert_eq!(quote.price, dec!(1688));
        assert_eq!(quote.volume, Some(dec!(3215300)));
        assert_eq!(quote.change_percent, Some(dec!(0.78)));
        assert_eq!(quote.currency.as_deref(), Some("CNY"));
    }

    #[test]
    fn test_suspended_quote_fields() {
        let body = r#"{"rc": 0, "data": {"f43": 10.5, "f44": "-", "f45": "-", "f46": "-", "f60": 10.5}}"#;
        let quote = parse_quote("600000", body).unwrap();
        assert_eq!(quote.high, None);
        assert_eq!(quote.change, Some(dec!(0)));
    }

    #[test]
    fn test_null_data_is_not_found() {
        let err = parse_quote("600000", r#"{"rc": 0, "data": null}"#).unwrap_err();
        assert!(matches!(err, MarketDataError::NotFound { .. }));
    }

    #[test]
    fn test_kline_parsing() {
        let body = r#"{
            "rc": 0,
            "data": {
                "code": "600519",
                "klines": [
                    "2024-01-02,1715.00,1685.01,1718.19,1678.10,32153,5437788416.00",
                    "2024-01-03,1681.11,1694.00,1695.22,1676.33,20834,3508326144.00",
                    "garbage"
                ]
            }
        }"#;
        let range = HistoryRange::daily(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let series = parse_klines("600519", &range, body).unwrap();
        assert_eq!(series.bars.len(), 2);
        assert_eq!(series.bars[0].open, Some(dec!(1715.00)));
        assert_eq!(series.bars[0].close, dec!(1685.01));
        assert_eq!(series.bars[0].high, Some(dec!(1718.19)));
        assert_eq!(series.bars[1].volume, Some(dec!(2083400)));
    }
}
