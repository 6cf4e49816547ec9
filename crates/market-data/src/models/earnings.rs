use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One reported (or scheduled) earnings period
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarningsReport {
    pub fiscal_date_ending: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_eps: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_eps: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surprise: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surprise_percent: Option<Decimal>,
}

/// Earnings history for an instrument, most recent period first
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Earnings {
    pub symbol: String,
    pub reports: Vec<EarningsReport>,
    pub source: String,
}

impl Earnings {
    pub fn new(symbol: impl Into<String>, mut reports: Vec<EarningsReport>, source: impl Into<String>) -> Self {
        reports.sort_by(|a, b| b.fiscal_date_ending.cmp(&a.fiscal_date_ending));
        Self {
            symbol: symbol.into(),
            reports,
            source: source.into(),
        }
    }

    pub fn latest(&self) -> Option<&EarningsReport> {
        self.reports.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(year: i32, month: u32) -> EarningsReport {
        EarningsReport {
            fiscal_date_ending: NaiveDate::from_ymd_opt(year, month, 30).unwrap(),
            reported_date: None,
            reported_eps: None,
            estimated_eps: None,
            surprise: None,
            surprise_percent: None,
        }
    }

    #[test]
    fn test_reports_newest_first() {
        let earnings = Earnings::new("AAPL", vec![report(2023, 6), report(2024, 6), report(2023, 9)], "FINNHUB");
        assert_eq!(
            earnings.latest().map(|r| r.fiscal_date_ending),
            NaiveDate::from_ymd_opt(2024, 6, 30)
        );
    }
}
