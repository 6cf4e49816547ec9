use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest market quote for an instrument
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol as requested by the caller (normalized)
    pub symbol: String,

    /// Last traded / current price (required)
    pub price: Decimal,

    /// Session open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    /// Session high
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    /// Session low
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    /// Previous session close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<Decimal>,

    /// Absolute change versus previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,

    /// Percent change versus previous close (2.5 means 2.5%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,

    /// Traded volume for the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,

    /// Quote currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Time the provider stamped the quote with
    pub timestamp: DateTime<Utc>,

    /// Provider that produced the quote (YAHOO, EASTMONEY, ...)
    pub source: String,
}

impl Quote {
    /// Create a quote with only the required fields.
    pub fn new(symbol: impl Into<String>, price: Decimal, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            change: None,
            change_percent: None,
            volume: None,
            currency: None,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Fill `change` and `change_percent` from `previous_close` when the provider
    /// did not send them.
    pub fn with_derived_change(mut self) -> Self {
        if let Some(prev) = self.previous_close.filter(|p| !p.is_zero()) {
            if self.change.is_none() {
                self.change = Some(self.price - prev);
            }
            if self.change_percent.is_none() {
                self.change_percent = Some(((self.price - prev) / prev * Decimal::ONE_HUNDRED).round_dp(4));
            }
        }
        self
    }
}
