use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{DataKind, DataRequest};
use crate::segment::normalize_symbol;

/// Identity of a cached answer and of an in-flight request.
///
/// A pure function of the data kind, the normalized symbol and the request
/// parameters sorted by name, so equivalent requests always share a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    kind: DataKind,
    symbol: String,
    params: String,
}

impl CacheKey {
    pub fn new(kind: DataKind, symbol: &str, params: &[(&str, String)]) -> Self {
        let mut params: Vec<(&str, &str)> = params
            .iter()
            .map(|(name, value)| (*name, value.trim()))
            .collect();
        params.sort_unstable();
        let params = params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");

        Self {
            kind,
            symbol: normalize_symbol(symbol),
            params,
        }
    }

    pub fn for_request(request: &DataRequest) -> Self {
        Self::new(request.kind(), &request.symbol(), &request.params())
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Whether this key belongs to `symbol`, and to `kind` when one is given.
    pub fn matches(&self, symbol: &str, kind: Option<DataKind>) -> bool {
        self.symbol == symbol && kind.map_or(true, |kind| self.kind == kind)
    }

    /// Sorted `name=value` pairs joined by `&`; empty when there are none.
    pub fn params(&self) -> &str {
        &self.params
    }
}

/// `kind:SYMBOL` or `kind:SYMBOL?a=1&b=2`. This is also the persistent row key.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}:{}", self.kind, self.symbol)
        } else {
            write!(f, "{}:{}?{}", self.kind, self.symbol, self.params)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::HistoryRange;

    #[test]
    fn test_symbol_is_normalized() {
        assert_eq!(
            CacheKey::new(DataKind::Quote, " aapl", &[]),
            CacheKey::new(DataKind::Quote, "AAPL", &[])
        );
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let a = CacheKey::new(
            DataKind::History,
            "AAPL",
            &[("start", "2024-01-01".into()), ("end", "2024-02-01".into())],
        );
        let b = CacheKey::new(
            DataKind::History,
            "AAPL",
            &[("end", "2024-02-01".into()), ("start", "2024-01-01".into())],
        );
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "history:AAPL?end=2024-02-01&start=2024-01-01");
    }

    #[test]
    fn test_kind_separates_keys() {
        assert_ne!(
            CacheKey::new(DataKind::Quote, "AAPL", &[]),
            CacheKey::new(DataKind::Fundamentals, "AAPL", &[])
        );
    }

    #[test]
    fn test_request_key() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let request = DataRequest::history("aapl", HistoryRange::daily(start, end));

        let key = CacheKey::for_request(&request);
        assert_eq!(key.kind(), DataKind::History);
        assert_eq!(key.symbol(), "AAPL");
        assert_eq!(key.params(), "end=2024-03-31&interval=1d&start=2024-01-01");

        let macro_key = CacheKey::for_request(&DataRequest::macro_indicator("cpi"));
        assert_eq!(macro_key.to_string(), "macro_indicator:ECON:CPI");
    }
}
