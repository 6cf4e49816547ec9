//! Sina Finance provider for domestic futures.
//!
//! - Quotes from the `hq.sinajs.cn` text feed
//! - Daily bars from the futures k-line JSONP service
//!
//! Commodity contracts are addressed as `nf_RB2405`, financial (CFFEX)
//! contracts as `CFF_RE_IF2406`. The feed rejects requests without a
//! finance.sina.com.cn referer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use reqwest::{header, Client};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{DataKind, HistoryRange, Interval, PriceBar, PriceSeries, Quote};
use crate::provider::http::{self, decimal_str};
use crate::provider::{AdapterDescriptor, MarketDataProvider};
use crate::segment::{self, FuturesContract, FuturesVenue, Segment};

const PROVIDER_ID: &str = "SINA_FUTURES";
const QUOTE_URL: &str = "https://hq.sinajs.cn/list=";
const KLINE_URL: &str = "https://stock2.finance.sina.com.cn/futures/api/jsonp.php/var%20_kline=";
const REFERER: &str = "https://finance.sina.com.cn";

/// One bar of the k-line service; every value is a string
#[derive(Debug, Deserialize)]
struct KlineRow {
    d: String,
    o: Option<String>,
    h: Option<String>,
    l: Option<String>,
    c: String,
    v: Option<String>,
}

pub struct SinaFuturesProvider {
    client: Client,
}

impl Default for SinaFuturesProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SinaFuturesProvider {
    pub fn new() -> Self {
        Self {
            client: http::build_client(Duration::from_secs(15)),
        }
    }

    fn contract(symbol: &str) -> Result<FuturesContract, MarketDataError> {
        segment::futures_contract(symbol).ok_or_else(|| MarketDataError::not_found(PROVIDER_ID, symbol))
    }

    async fn get(&self, symbol: &str, url: &str) -> Result<String, MarketDataError> {
        let request = self.client.get(url).header(header::REFERER, REFERER);
        http::send(PROVIDER_ID, symbol, request).await
    }
}

/// Symbol on the `hq.sinajs.cn` feed.
fn feed_symbol(contract: &FuturesContract) -> String {
    match contract.venue {
        FuturesVenue::Cffex => format!("CFF_RE_{}", contract.contract),
        _ => format!("nf_{}", contract.contract),
    }
}

/// K-line service endpoint for the contract's venue.
fn kline_service(contract: &FuturesContract) -> &'static str {
    match contract.venue {
        FuturesVenue::Cffex => "CffexFuturesService.getCffexFuturesDailyKLine",
        _ => "InnerFuturesNewService.getDailyKLine",
    }
}

/// Extract the comma separated payload from `var hq_str_xxx="...";`.
fn feed_fields(symbol: &str, body: &str) -> Result<Vec<String>, MarketDataError> {
    let start = body
        .find('"')
        .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "missing quote payload"))?;
    let end = body
        .rfind('"')
        .filter(|end| *end > start)
        .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "unterminated quote payload"))?;
    let payload = &body[start + 1..end];
    // Unknown contracts come back as an empty string
    if payload.trim().is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    Ok(payload.split(',').map(str::to_string).collect())
}

fn at(fields: &[String], idx: usize) -> Option<Decimal> {
    fields
        .get(idx)
        .and_then(|v| decimal_str(v))
        .filter(|v| !v.is_zero())
}

fn parse_quote(symbol: &str, venue: FuturesVenue, body: &str) -> Result<Quote, MarketDataError> {
    let fields = feed_fields(symbol, body)?;

    // Field positions differ between the commodity and financial feeds
    let (price, open, high, low, volume, prev_settle, date_idx) = match venue {
        FuturesVenue::Cffex => (3, 0, 1, 2, 4, 13, 36),
        _ => (8, 2, 3, 4, 14, 10, 17),
    };

    let price = at(&fields, price).ok_or_else(|| {
        MarketDataError::malformed(PROVIDER_ID, format!("no last price in {} fields", fields.len()))
    })?;

    let mut quote = Quote::new(symbol, price, PROVIDER_ID);
    quote.open = at(&fields, open);
    quote.high = at(&fields, high);
    quote.low = at(&fields, low);
    quote.volume = fields.get(volume).and_then(|v| decimal_str(v));
    quote.previous_close = at(&fields, prev_settle);
    quote.currency = Some("CNY".to_string());
    if let Some(date) = fields
        .get(date_idx)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    {
        let time = match venue {
            FuturesVenue::Cffex => fields.get(date_idx + 1),
            _ => fields.get(1),
        }
        .and_then(|t| parse_feed_time(date, t));
        quote.timestamp = time.unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Ok(quote.with_derived_change())
}

/// Feed times are Beijing time (UTC+8), `145958` or `14:59:58`.
fn parse_feed_time(date: NaiveDate, time: &str) -> Option<chrono::DateTime<Utc>> {
    let digits: String = time.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 6 {
        return None;
    }
    let local = NaiveDateTime::parse_from_str(&format!("{} {}", date, digits), "%Y-%m-%d %H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&(local - chrono::Duration::hours(8))))
}

fn parse_klines(symbol: &str, range: &HistoryRange, body: &str) -> Result<PriceSeries, MarketDataError> {
    let start = body.find('(');
    let end = body.rfind(')');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &body[s + 1..e],
        _ => return Err(MarketDataError::malformed(PROVIDER_ID, "missing JSONP wrapper")),
    };
    if json.trim() == "null" || json.trim().is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }

    let rows: Vec<KlineRow> = http::parse_json(PROVIDER_ID, "kline", json)?;
    let bars = rows
        .into_iter()
        .filter_map(|row| {
            let date = NaiveDate::parse_from_str(&row.d, "%Y-%m-%d").ok()?;
            Some(PriceBar {
                timestamp: Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?),
                open: row.o.as_deref().and_then(decimal_str),
                high: row.h.as_deref().and_then(decimal_str),
                low: row.l.as_deref().and_then(decimal_str),
                close: decimal_str(&row.c)?,
                volume: row.v.as_deref().and_then(decimal_str),
            })
        })
        .collect();

    let mut series = PriceSeries::new(symbol, range, bars, PROVIDER_ID);
    if series.is_empty() {
        return Err(MarketDataError::not_found(PROVIDER_ID, symbol));
    }
    series.currency = Some("CNY".to_string());
    Ok(series)
}

#[async_trait]
impl MarketDataProvider for SinaFuturesProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor::new(PROVIDER_ID)
            .priority(10)
            .kinds(&[DataKind::Quote, DataKind::History])
            .segments(&[Segment::ChinaFutures])
            .rate_limit(60, None)
            .request_timeout(Duration::from_secs(8))
    }

    fn supports_symbol(&self, symbol: &str) -> bool {
        segment::futures_contract(symbol).is_some()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let contract = Self::contract(symbol)?;
        let url = format!("{}{}", QUOTE_URL, feed_symbol(&contract));
        debug!("Sina futures quote for {} via {}", symbol, url);
        let body = self.get(symbol, &url).await?;
        parse_quote(symbol, contract.venue, &body)
    }

    async fn get_history(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<PriceSeries, MarketDataError> {
        if range.interval != Interval::Daily {
            warn!("Sina futures only serves daily bars, {} requested", range.interval.as_str());
            return Err(MarketDataError::NotSupported {
                operation: format!("history/{}", range.interval.as_str()),
                provider: PROVIDER_ID.to_string(),
            });
        }
        let contract = Self::contract(symbol)?;
        let url = format!(
            "{}/{}?symbol={}",
            KLINE_URL,
            kline_service(&contract),
            contract.contract
        );
        let body = self.get(symbol, &url).await?;
        parse_klines(symbol, range, &body)
    }
}
