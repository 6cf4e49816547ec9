use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::data_kind::DataKind;
use super::history::HistoryRange;
use super::macro_data::macro_symbol;
use crate::segment::normalize_symbol;

/// A typed request for one piece of market data.
///
/// Constructors normalize the symbol so two requests for `aapl` and ` AAPL `
/// share a cache entry and an in-flight slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataRequest {
    Quote { symbol: String },
    History { symbol: String, range: HistoryRange },
    Fundamentals { symbol: String },
    CompanyInfo { symbol: String },
    OptionsChain { symbol: String, expiry: Option<NaiveDate> },
    OptionsExpirations { symbol: String },
    Earnings { symbol: String },
    MacroIndicator { indicator: String },
}

impl DataRequest {
    pub fn quote(symbol: &str) -> Self {
        Self::Quote {
            symbol: normalize_symbol(symbol),
        }
    }

    pub fn history(symbol: &str, range: HistoryRange) -> Self {
        Self::History {
            symbol: normalize_symbol(symbol),
            range,
        }
    }

    pub fn fundamentals(symbol: &str) -> Self {
        Self::Fundamentals {
            symbol: normalize_symbol(symbol),
        }
    }

    pub fn company_info(symbol: &str) -> Self {
        Self::CompanyInfo {
            symbol: normalize_symbol(symbol),
        }
    }

    /// Options chain for `expiry`, or the nearest listed expiration when `None`.
    pub fn options_chain(symbol: &str, expiry: Option<NaiveDate>) -> Self {
        Self::OptionsChain {
            symbol: normalize_symbol(symbol),
            expiry,
        }
    }

    pub fn options_expirations(symbol: &str) -> Self {
        Self::OptionsExpirations {
            symbol: normalize_symbol(symbol),
        }
    }

    pub fn earnings(symbol: &str) -> Self {
        Self::Earnings {
            symbol: normalize_symbol(symbol),
        }
    }

    /// Macro indicator by name (`CPI`, `REAL_GDP`, ...). A leading `ECON:` is accepted.
    pub fn macro_indicator(name: &str) -> Self {
        let name = name.trim();
        let name = name
            .get(..5)
            .filter(|p| p.eq_ignore_ascii_case("ECON:"))
            .map_or(name, |_| &name[5..]);
        Self::MacroIndicator {
            indicator: name.trim().to_uppercase(),
        }
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Self::Quote { .. } => DataKind::Quote,
            Self::History { .. } => DataKind::History,
            Self::Fundamentals { .. } => DataKind::Fundamentals,
            Self::CompanyInfo { .. } => DataKind::CompanyInfo,
            Self::OptionsChain { .. } => DataKind::OptionsChain,
            Self::OptionsExpirations { .. } => DataKind::OptionsExpirations,
            Self::Earnings { .. } => DataKind::Earnings,
            Self::MacroIndicator { .. } => DataKind::MacroIndicator,
        }
    }

    /// Symbol used for segment detection, caching and metrics.
    ///
    /// Macro indicators map to the `ECON:<NAME>` pseudo-symbol.
    pub fn symbol(&self) -> Cow<'_, str> {
        match self {
            Self::Quote { symbol }
            | Self::History { symbol, .. }
            | Self::Fundamentals { symbol }
            | Self::CompanyInfo { symbol }
            | Self::OptionsChain { symbol, .. }
            | Self::OptionsExpirations { symbol }
            | Self::Earnings { symbol } => Cow::Borrowed(symbol),
            Self::MacroIndicator { indicator } => Cow::Owned(macro_symbol(indicator)),
        }
    }

    /// Extra parameters that distinguish requests of the same kind and symbol.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::History { range, .. } => range.key_params(),
            Self::OptionsChain {
                expiry: Some(date), ..
            } => vec![("expiry", date.to_string())],
            _ => Vec::new(),
        }
    }
}
