use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Category of financial data being requested.
///
/// The kind selects the adapter capability a request needs and the default
/// time-to-live of the cached answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Quote,
    History,
    Fundamentals,
    CompanyInfo,
    OptionsChain,
    OptionsExpirations,
    Earnings,
    MacroIndicator,
}

impl DataKind {
    /// Every kind, in declaration order.
    pub const ALL: [DataKind; 8] = [
        DataKind::Quote,
        DataKind::History,
        DataKind::Fundamentals,
        DataKind::CompanyInfo,
        DataKind::OptionsChain,
        DataKind::OptionsExpirations,
        DataKind::Earnings,
        DataKind::MacroIndicator,
    ];

    /// Stable identifier used in cache keys, logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::History => "history",
            Self::Fundamentals => "fundamentals",
            Self::CompanyInfo => "company_info",
            Self::OptionsChain => "options_chain",
            Self::OptionsExpirations => "options_expirations",
            Self::Earnings => "earnings",
            Self::MacroIndicator => "macro_indicator",
        }
    }

    /// Built-in cache lifetime for this kind.
    ///
    /// Live prices go stale in seconds; descriptive company data barely changes.
    pub fn default_ttl(self) -> Duration {
        match self {
            Self::Quote => Duration::from_secs(30),
            Self::OptionsChain => Duration::from_secs(60),
            Self::History => Duration::from_secs(60 * 60),
            Self::OptionsExpirations => Duration::from_secs(6 * 60 * 60),
            Self::Earnings => Duration::from_secs(12 * 60 * 60),
            Self::Fundamentals | Self::MacroIndicator => Duration::from_secs(24 * 60 * 60),
            Self::CompanyInfo => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MarketDataError::Configuration(format!("unknown data kind '{}'", s)))
    }
}
