use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Valuation and financial ratios for an equity
///
/// Every metric is optional: providers cover different subsets and a missing
/// field never invalidates the rest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub symbol: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_pe: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pb_ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eps: Option<Decimal>,
    /// Dividend yield as a fraction (0.025 for 2.5%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_ttm: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margin: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_on_equity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week52_high: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week52_low: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<Decimal>,
}

impl Fundamentals {
    pub fn new(symbol: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    /// Number of populated metrics.
    pub fn populated(&self) -> usize {
        [
            self.market_cap,
            self.pe_ratio,
            self.forward_pe,
            self.pb_ratio,
            self.eps,
            self.dividend_yield,
            self.beta,
            self.revenue_ttm,
            self.profit_margin,
            self.return_on_equity,
            self.week52_high,
            self.week52_low,
            self.shares_outstanding,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }
}
