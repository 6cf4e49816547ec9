use serde::{Deserialize, Serialize};

use super::data_kind::DataKind;
use super::earnings::Earnings;
use super::fundamentals::Fundamentals;
use super::history::PriceSeries;
use super::macro_data::MacroSeries;
use super::options::{OptionExpirations, OptionsChain};
use super::profile::CompanyProfile;
use super::quote::Quote;
use crate::errors::MarketDataError;

/// Any payload an adapter can return. This is what the cache stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MarketData {
    Quote(Quote),
    History(PriceSeries),
    Fundamentals(Fundamentals),
    CompanyInfo(CompanyProfile),
    OptionsChain(OptionsChain),
    OptionsExpirations(OptionExpirations),
    Earnings(Earnings),
    MacroIndicator(MacroSeries),
}

impl MarketData {
    pub fn kind(&self) -> DataKind {
        match self {
            Self::Quote(_) => DataKind::Quote,
            Self::History(_) => DataKind::History,
            Self::Fundamentals(_) => DataKind::Fundamentals,
            Self::CompanyInfo(_) => DataKind::CompanyInfo,
            Self::OptionsChain(_) => DataKind::OptionsChain,
            Self::OptionsExpirations(_) => DataKind::OptionsExpirations,
            Self::Earnings(_) => DataKind::Earnings,
            Self::MacroIndicator(_) => DataKind::MacroIndicator,
        }
    }

    /// Provider that produced the payload.
    pub fn source(&self) -> &str {
        match self {
            Self::Quote(q) => &q.source,
            Self::History(s) => &s.source,
            Self::Fundamentals(f) => &f.source,
            Self::CompanyInfo(p) => &p.source,
            Self::OptionsChain(c) => &c.source,
            Self::OptionsExpirations(e) => &e.source,
            Self::Earnings(e) => &e.source,
            Self::MacroIndicator(m) => &m.source,
        }
    }
}

/// Typed extraction of a [`MarketData`] payload.
pub trait FromMarketData: Sized {
    const KIND: DataKind;

    fn from_market_data(data: MarketData) -> Result<Self, MarketDataError>;
}

macro_rules! impl_from_market_data {
    ($ty:ty, $variant:ident) => {
        impl FromMarketData for $ty {
            const KIND: DataKind = DataKind::$variant;

            fn from_market_data(data: MarketData) -> Result<Self, MarketDataError> {
                match data {
                    MarketData::$variant(inner) => Ok(inner),
                    other => Err(MarketDataError::PayloadMismatch {
                        expected: Self::KIND.to_string(),
                        actual: other.kind().to_string(),
                    }),
                }
            }
        }

        impl From<$ty> for MarketData {
            fn from(value: $ty) -> Self {
                MarketData::$variant(value)
            }
        }
    };
}

impl_from_market_data!(Quote, Quote);
impl_from_market_data!(PriceSeries, History);
impl_from_market_data!(Fundamentals, Fundamentals);
impl_from_market_data!(CompanyProfile, CompanyInfo);
impl_from_market_data!(OptionsChain, OptionsChain);
impl_from_market_data!(OptionExpirations, OptionsExpirations);
impl_from_market_data!(Earnings, Earnings);
impl_from_market_data!(MacroSeries, MacroIndicator);

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_extract_matching_kind() {
        let data: MarketData = Quote::new("AAPL", dec!(101.5), "TEST").into();
        let quote = Quote::from_market_data(data).unwrap();
        assert_eq!(quote.price, dec!(101.5));
    }

    #[test]
    fn test_extract_mismatch_is_payload_mismatch() {
        let data: MarketData = Quote::new("AAPL", dec!(1), "TEST").into();
        let err = Fundamentals::from_market_data(data).unwrap_err();
        assert_eq!(
            err,
            MarketDataError::PayloadMismatch {
                expected: "fundamentals".to_string(),
                actual: "quote".to_string(),
            }
        );
    }

    #[test]
    fn test_json_shape_is_tagged() {
        let data: MarketData = Quote::new("AAPL", dec!(1), "TEST").into();
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "quote");
        assert_eq!(json["data"]["symbol"], "AAPL");
        let back: MarketData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }
}
