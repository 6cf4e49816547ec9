use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bar size of a historical series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "1d",
            Self::Weekly => "1wk",
            Self::Monthly => "1mo",
        }
    }
}

/// Requested window of a historical series (both ends inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub interval: Interval,
}

impl HistoryRange {
    /// Daily bars between `start` and `end`.
    pub fn daily(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            interval: Interval::Daily,
        }
    }

    /// Daily bars covering the last `days` days up to today.
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now().date_naive();
        Self::daily(end - chrono::Duration::days(days), end)
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Parameters in the canonical order used for cache keys.
    pub fn key_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("end", self.end.to_string()),
            ("interval", self.interval.as_str().to_string()),
            ("start", self.start.to_string()),
        ]
    }
}

/// One OHLCV bar
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    pub close: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

/// Historical price series for one instrument
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub interval: Interval,
    /// Bars ordered by timestamp ascending
    pub bars: Vec<PriceBar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub source: String,
}

impl PriceSeries {
    /// Build a series, sorting bars and dropping those outside `range`.
    pub fn new(
        symbol: impl Into<String>,
        range: &HistoryRange,
        mut bars: Vec<PriceBar>,
        source: impl Into<String>,
    ) -> Self {
        bars.retain(|bar| range.contains(bar.timestamp.date_naive()));
        bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Self {
            symbol: symbol.into(),
            interval: range.interval,
            bars,
            currency: None,
            source: source.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.bars.last().map(|bar| bar.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(day: u32, close: Decimal) -> PriceBar {
        PriceBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }

    #[test]
    fn test_series_sorts_and_filters() {
        let range = HistoryRange::daily(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
        );
        let series = PriceSeries::new(
            "AAPL",
            &range,
            vec![bar(4, dec!(103)), bar(1, dec!(100)), bar(2, dec!(101)), bar(5, dec!(104))],
            "TEST",
        );

        assert_eq!(series.bars.len(), 2);
        assert_eq!(series.bars[0].close, dec!(101));
        assert_eq!(series.last_close(), Some(dec!(103)));
    }

    #[test]
    fn test_key_params_are_sorted() {
        let range = HistoryRange::last_days(30).with_interval(Interval::Weekly);
        let names: Vec<_> = range.key_params().into_iter().map(|(k, _)| k).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
