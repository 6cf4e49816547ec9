//! Market segment detection.
//!
//! [`detect`] is the only place a symbol is classified. Adapters that need to
//! rebuild a provider-specific symbol use the helpers exported here
//! ([`exchange_of`], [`china_code`], [`hk_code`], [`futures_contract`]) rather
//! than re-parsing the symbol themselves.
//!
//! Rules are evaluated in order, first match wins:
//!
//! 1. Explicit markers: `ECON:` prefix, exchange suffixes (`.SS`, `.SH`, `.SZ`,
//!    `.BJ`, `.HK`, `.US`) and exchange prefixes (`SH600519`, `HK00700`)
//! 2. Numeric code tables: six digit domestic codes, four or five digit Hong Kong codes
//! 3. Futures product codes (`RB2405`, `CFFEX.IF`, `nf_M2409`)
//! 4. Everything else is a US listing

mod rules;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use rules::{ChinaExchange, FuturesContract, FuturesVenue};

use crate::models::MACRO_SYMBOL_PREFIX;

/// Market segment a symbol trades in. Drives adapter eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Shanghai, Shenzhen and Beijing listed equities and funds
    ChinaA,
    /// US listed equities and ETFs; the fallback for unrecognised symbols
    UnitedStates,
    /// Hong Kong listed equities
    HongKong,
    /// Domestic commodity and financial futures
    ChinaFutures,
    /// Macro-economic indicator pseudo-symbols (`ECON:CPI`)
    Economic,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::ChinaA,
        Segment::UnitedStates,
        Segment::HongKong,
        Segment::ChinaFutures,
        Segment::Economic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChinaA => "china_a",
            Self::UnitedStates => "united_states",
            Self::HongKong => "hong_kong",
            Self::ChinaFutures => "china_futures",
            Self::Economic => "economic",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical form of a user supplied symbol: trimmed and upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Classify a symbol. Pure and total.
///
/// # Examples
///
/// ```
/// use quoteflow_market_data::segment::{detect, Segment};
///
/// assert_eq!(detect("600519"), Segment::ChinaA);
/// assert_eq!(detect("0700.HK"), Segment::HongKong);
/// assert_eq!(detect("rb2405"), Segment::ChinaFutures);
/// assert_eq!(detect("ECON:CPI"), Segment::Economic);
/// assert_eq!(detect("AAPL"), Segment::UnitedStates);
/// ```
pub fn detect(symbol: &str) -> Segment {
    let symbol = normalize_symbol(symbol);

    // 1. explicit markers
    if symbol.starts_with(MACRO_SYMBOL_PREFIX) {
        return Segment::Economic;
    }
    if rules::explicit_china_code(&symbol).is_some() {
        return Segment::ChinaA;
    }
    if rules::explicit_hk_code(&symbol).is_some() {
        return Segment::HongKong;
    }
    if symbol.ends_with(".US") {
        return Segment::UnitedStates;
    }

    // 2. numeric code tables
    if !symbol.is_empty() && symbol.bytes().all(|b| b.is_ascii_digit()) {
        match symbol.len() {
            6 if rules::exchange_for_code(&symbol).is_some() => return Segment::ChinaA,
            4 | 5 => return Segment::HongKong,
            _ => {}
        }
    }

    // 3. futures product codes
    if rules::parse_futures(&symbol).is_some() {
        return Segment::ChinaFutures;
    }

    Segment::UnitedStates
}

/// Venue of a domestic equity symbol (`600519`, `600519.SS`, `SZ000001`).
pub fn exchange_of(symbol: &str) -> Option<ChinaExchange> {
    china_code(symbol).map(|(exchange, _)| exchange)
}

/// Venue and bare six digit code of a domestic equity symbol.
pub fn china_code(symbol: &str) -> Option<(ChinaExchange, String)> {
    let symbol = normalize_symbol(symbol);
    if let Some((exchange, code)) = rules::explicit_china_code(&symbol) {
        return Some((exchange, code.to_string()));
    }
    rules::exchange_for_code(&symbol).map(|exchange| (exchange, symbol))
}

/// Numeric Hong Kong stock code (`700` for `0700.HK`, `HK00700` or `00700`).
pub fn hk_code(symbol: &str) -> Option<u32> {
    let symbol = normalize_symbol(symbol);
    let digits = match rules::explicit_hk_code(&symbol) {
        Some(code) => code,
        None if matches!(symbol.len(), 4 | 5) => symbol.as_str(),
        None => return None,
    };
    digits.parse().ok()
}

/// Domestic futures contract named by the symbol, if any.
pub fn futures_contract(symbol: &str) -> Option<FuturesContract> {
    rules::parse_futures(&normalize_symbol(symbol))
}

/// Plain US ticker (`AAPL` for `aapl.us`).
pub fn us_ticker(symbol: &str) -> String {
    let symbol = normalize_symbol(symbol);
    match symbol.strip_suffix(".US") {
        Some(ticker) => ticker.to_string(),
        None => symbol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_markers() {
        assert_eq!(detect("ECON:GDP"), Segment::Economic);
        assert_eq!(detect("600519.SS"), Segment::ChinaA);
        assert_eq!(detect("000001.sz"), Segment::ChinaA);
        assert_eq!(detect("830799.BJ"), Segment::ChinaA);
        assert_eq!(detect("SH600519"), Segment::ChinaA);
        assert_eq!(detect("9988.HK"), Segment::HongKong);
        assert_eq!(detect("HK00700"), Segment::HongKong);
        assert_eq!(detect("BABA.US"), Segment::UnitedStates);
    }

    #[test]
    fn test_numeric_tables() {
        assert_eq!(detect("600519"), Segment::ChinaA);
        assert_eq!(detect("300750"), Segment::ChinaA);
        assert_eq!(detect("00700"), Segment::HongKong);
        assert_eq!(detect("0005"), Segment::HongKong);
        // six digits outside every venue table
        assert_eq!(detect("999999"), Segment::UnitedStates);
    }

    #[test]
    fn test_futures_products() {
        assert_eq!(detect("RB2405"), Segment::ChinaFutures);
        assert_eq!(detect("SHFE.CU2409"), Segment::ChinaFutures);
        assert_eq!(detect("nf_M2409"), Segment::ChinaFutures);
        assert_eq!(detect("CFFEX.IF"), Segment::ChinaFutures);
    }

    #[test]
    fn test_default_is_united_states() {
        for symbol in ["AAPL", "M", "T", "BRK.B", "", "  "] {
            assert_eq!(detect(symbol), Segment::UnitedStates, "{symbol:?}");
        }
    }

    #[test]
    fn test_helpers() {
        assert_eq!(exchange_of("600519"), Some(ChinaExchange::Shanghai));
        assert_eq!(exchange_of("sz000001"), Some(ChinaExchange::Shenzhen));
        assert_eq!(exchange_of("AAPL"), None);
        assert_eq!(
            china_code("600519.ss"),
            Some((ChinaExchange::Shanghai, "600519".to_string()))
        );
        assert_eq!(hk_code("0700.HK"), Some(700));
        assert_eq!(hk_code("00005"), Some(5));
        assert_eq!(hk_code("AAPL"), None);
        assert_eq!(us_ticker("brk-b.us"), "BRK-B");
        assert_eq!(futures_contract("rb2405").map(|c| c.venue), Some(FuturesVenue::Shfe));
    }
}
