use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::models::DataKind;

/// How a facade call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Served by the first adapter tried.
    Success,
    CacheHit,
    /// Served after at least one adapter failed.
    FallbackUsed,
    /// No adapter could serve it, or every one failed.
    Failure,
    Timeout,
    /// Every adapter in play was rate limited.
    RateLimited,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::CacheHit => "cache_hit",
            Self::FallbackUsed => "fallback_used",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Whether the caller got data.
    pub fn is_served(self) -> bool {
        matches!(self, Self::Success | Self::CacheHit | Self::FallbackUsed)
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

/// One facade call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    /// Sequence number, assigned by the recorder.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: DataKind,
    pub symbol: String,
    /// Adapters actually called, in order.
    pub adapters_attempted: Vec<String>,
    pub adapter_used: Option<String>,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
    pub outcome: CallOutcome,
}

impl CallRecord {
    pub fn new(kind: DataKind, symbol: impl Into<String>, outcome: CallOutcome, latency: Duration) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            kind,
            symbol: symbol.into(),
            adapters_attempted: Vec::new(),
            adapter_used: None,
            latency,
            outcome,
        }
    }

    pub fn attempted(mut self, adapters: Vec<String>) -> Self {
        self.adapters_attempted = adapters;
        self
    }

    pub fn used(mut self, adapter: Option<String>) -> Self {
        self.adapter_used = adapter;
        self
    }
}

/// Selects call records. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallFilter {
    pub kind: Option<DataKind>,
    pub symbol: Option<String>,
    pub outcome: Option<CallOutcome>,
    /// Matches records where this adapter was attempted or used.
    pub adapter: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Newest records first, at most this many.
    pub limit: Option<usize>,
}

impl CallFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: DataKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(crate::segment::normalize_symbol(symbol));
        self
    }

    pub fn outcome(mut self, outcome: CallOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &CallRecord) -> bool {
        self.kind.map_or(true, |kind| record.kind == kind)
            && self
                .symbol
                .as_ref()
                .map_or(true, |symbol| &record.symbol == symbol)
            && self.outcome.map_or(true, |outcome| record.outcome == outcome)
            && self.adapter.as_ref().map_or(true, |adapter| {
                record.adapter_used.as_ref() == Some(adapter)
                    || record.adapters_attempted.contains(adapter)
            })
            && self.since.map_or(true, |since| record.timestamp >= since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CallRecord {
        CallRecord::new(
            DataKind::Quote,
            "AAPL",
            CallOutcome::FallbackUsed,
            Duration::from_millis(120),
        )
        .attempted(vec!["YAHOO".to_string(), "FINNHUB".to_string()])
        .used(Some("FINNHUB".to_string()))
    }

    #[test]
    fn test_filter_matching() {
        let record = record();
        assert!(CallFilter::all().matches(&record));
        assert!(CallFilter::all().symbol("aapl").matches(&record));
        assert!(CallFilter::all().adapter("YAHOO").matches(&record));
        assert!(!CallFilter::all().adapter("EASTMONEY").matches(&record));
        assert!(!CallFilter::all().kind(DataKind::History).matches(&record));
        assert!(!CallFilter::all().outcome(CallOutcome::Success).matches(&record));
        assert!(!CallFilter::all()
            .since(record.timestamp + chrono::Duration::seconds(1))
            .matches(&record));
    }

    #[test]
    fn test_record_json() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["outcome"], "fallback_used");
        assert_eq!(json["kind"], "quote");
        assert_eq!(json["latency_ms"], 120.0);
        assert_eq!(json["adapter_used"], "FINNHUB");
    }

    #[test]
    fn test_served_outcomes() {
        assert!(CallOutcome::CacheHit.is_served());
        assert!(!CallOutcome::RateLimited.is_served());
    }
}
