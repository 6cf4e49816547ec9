//! Lookup tables behind segment detection.
//!
//! Code prefixes for the three domestic equity venues and the product codes
//! traded on the six domestic futures venues.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Domestic (China-A) equity venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChinaExchange {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl ChinaExchange {
    /// Two-letter prefix (`SH600519`).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Shanghai => "SH",
            Self::Shenzhen => "SZ",
            Self::Beijing => "BJ",
        }
    }
}

/// Domestic futures venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuturesVenue {
    Shfe,
    Dce,
    Czce,
    Ine,
    Gfex,
    Cffex,
}

impl FuturesVenue {
    pub fn code(self) -> &'static str {
        match self {
            Self::Shfe => "SHFE",
            Self::Dce => "DCE",
            Self::Czce => "CZCE",
            Self::Ine => "INE",
            Self::Gfex => "GFEX",
            Self::Cffex => "CFFEX",
        }
    }
}

/// Shanghai: main board, STAR market, CDRs, B shares, ETFs and funds.
const SSE_PREFIXES: &[&str] = &[
    "600", "601", "603", "605", "688", "689", "900", "500", "510", "511", "512", "513", "515",
    "516", "517", "518", "588",
];

/// Shenzhen: main board, ChiNext, B shares, ETFs and LOFs.
const SZSE_PREFIXES: &[&str] = &[
    "000", "001", "002", "003", "004", "300", "301", "200", "159", "160", "161", "162", "163",
    "164", "165", "166", "167", "168", "169",
];

/// Beijing Stock Exchange and the NEEQ codes it inherited.
const BSE_PREFIXES: &[&str] = &[
    "430", "830", "831", "832", "833", "834", "835", "836", "837", "838", "839", "870", "871",
    "872", "873", "920",
];

const VENUE_PREFIXES: &[(&str, Option<FuturesVenue>)] = &[
    ("SHFE.", Some(FuturesVenue::Shfe)),
    ("DCE.", Some(FuturesVenue::Dce)),
    ("CZCE.", Some(FuturesVenue::Czce)),
    ("INE.", Some(FuturesVenue::Ine)),
    ("GFEX.", Some(FuturesVenue::Gfex)),
    ("CFFEX.", Some(FuturesVenue::Cffex)),
    ("NF_", None),
];

lazy_static! {
    /// Product code -> listing venue
    static ref FUTURES_PRODUCTS: HashMap<&'static str, FuturesVenue> = {
        let table: &[(FuturesVenue, &[&str])] = &[
            (
                FuturesVenue::Shfe,
                &["CU", "AL", "ZN", "PB", "NI", "SN", "AU", "AG", "RB", "WR", "HC", "SS", "BU", "RU", "FU", "SP", "AO", "BR"],
            ),
            (
                FuturesVenue::Dce,
                &["A", "B", "M", "Y", "P", "C", "CS", "JD", "L", "V", "PP", "J", "JM", "I", "EG", "EB", "PG", "RR", "LH", "FB", "BB"],
            ),
            (
                FuturesVenue::Czce,
                &["SR", "CF", "CY", "TA", "MA", "FG", "RM", "OI", "ZC", "SF", "SM", "AP", "CJ", "UR", "SA", "PF", "PK", "PX", "SH", "WH", "PM", "RI", "LR", "JR", "RS"],
            ),
            (FuturesVenue::Ine, &["SC", "LU", "NR", "BC", "EC"]),
            (FuturesVenue::Gfex, &["SI", "LC", "PS"]),
            (FuturesVenue::Cffex, &["IF", "IH", "IC", "IM", "T", "TF", "TS", "TL"]),
        ];

        let mut products = HashMap::new();
        for (venue, codes) in table {
            for code in *codes {
                products.insert(*code, *venue);
            }
        }
        products
    };
}

/// A recognised domestic futures contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuturesContract {
    pub venue: FuturesVenue,
    /// Product code (`RB`, `IF`, ...)
    pub product: String,
    /// Product plus contract month (`RB2405`), or product plus `0` for the continuous contract
    pub contract: String,
}

/// Venue of a six digit domestic equity code.
pub(crate) fn exchange_for_code(code: &str) -> Option<ChinaExchange> {
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let head = &code[..3];
    if SSE_PREFIXES.contains(&head) {
        Some(ChinaExchange::Shanghai)
    } else if SZSE_PREFIXES.contains(&head) {
        Some(ChinaExchange::Shenzhen)
    } else if BSE_PREFIXES.contains(&head) {
        Some(ChinaExchange::Beijing)
    } else {
        None
    }
}

/// Exchange named by an explicit suffix or prefix, together with the bare code.
pub(crate) fn explicit_china_code(symbol: &str) -> Option<(ChinaExchange, &str)> {
    if let Some((code, suffix)) = symbol.rsplit_once('.') {
        let exchange = match suffix {
            "SS" | "SH" => ChinaExchange::Shanghai,
            "SZ" => ChinaExchange::Shenzhen,
            "BJ" => ChinaExchange::Beijing,
            _ => return None,
        };
        return Some((exchange, code));
    }

    if symbol.len() == 8 && symbol.is_char_boundary(2) {
        let (prefix, code) = symbol.split_at(2);
        if code.bytes().all(|b| b.is_ascii_digit()) {
            let exchange = match prefix {
                "SH" => ChinaExchange::Shanghai,
                "SZ" => ChinaExchange::Shenzhen,
                "BJ" => ChinaExchange::Beijing,
                _ => return None,
            };
            return Some((exchange, code));
        }
    }
    None
}

/// Hong Kong code named by `.HK` or an `HK` prefix.
pub(crate) fn explicit_hk_code(symbol: &str) -> Option<&str> {
    if let Some(code) = symbol.strip_suffix(".HK") {
        return Some(code);
    }
    symbol
        .strip_prefix("HK")
        .filter(|code| !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse a normalized symbol as a domestic futures contract.
///
/// A venue prefix or a trailing contract digit run is required so plain
/// tickers such as `M` or `T` are not mistaken for products.
pub(crate) fn parse_futures(symbol: &str) -> Option<FuturesContract> {
    let (rest, prefixed_venue) = VENUE_PREFIXES
        .iter()
        .find_map(|(prefix, venue)| symbol.strip_prefix(prefix).map(|rest| (rest, *venue)))
        .map_or((symbol, None), |(rest, venue)| (rest, Some(venue)));
    let has_prefix = prefixed_venue.is_some();

    let alpha_len = rest.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
    if alpha_len == 0 {
        return None;
    }
    let (product, digits) = rest.split_at(alpha_len);
    if !digits.bytes().all(|b| b.is_ascii_digit()) || digits.len() > 4 {
        return None;
    }
    if digits.is_empty() && !has_prefix {
        return None;
    }

    let venue = *FUTURES_PRODUCTS.get(product)?;
    if let Some(Some(declared)) = prefixed_venue {
        if declared != venue {
            return None;
        }
    }

    let contract = if digits.is_empty() {
        format!("{}0", product)
    } else {
        rest.to_string()
    };

    Some(FuturesContract {
        venue,
        product: product.to_string(),
        contract,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_for_code() {
        assert_eq!(exchange_for_code("600519"), Some(ChinaExchange::Shanghai));
        assert_eq!(exchange_for_code("688981"), Some(ChinaExchange::Shanghai));
        assert_eq!(exchange_for_code("000001"), Some(ChinaExchange::Shenzhen));
        assert_eq!(exchange_for_code("300750"), Some(ChinaExchange::Shenzhen));
        assert_eq!(exchange_for_code("830799"), Some(ChinaExchange::Beijing));
        assert_eq!(exchange_for_code("999999"), None);
        assert_eq!(exchange_for_code("60051"), None);
    }

    #[test]
    fn test_explicit_codes() {
        assert_eq!(
            explicit_china_code("600519.SS"),
            Some((ChinaExchange::Shanghai, "600519"))
        );
        assert_eq!(
            explicit_china_code("SZ000001"),
            Some((ChinaExchange::Shenzhen, "000001"))
        );
        assert_eq!(explicit_china_code("AAPL"), None);
        assert_eq!(explicit_hk_code("0700.HK"), Some("0700"));
        assert_eq!(explicit_hk_code("HK00700"), Some("00700"));
        assert_eq!(explicit_hk_code("HKD"), None);
    }

    #[test]
    fn test_parse_futures() {
        let contract = parse_futures("RB2405").unwrap();
        assert_eq!(contract.venue, FuturesVenue::Shfe);
        assert_eq!(contract.product, "RB");
        assert_eq!(contract.contract, "RB2405");

        let contract = parse_futures("CFFEX.IF").unwrap();
        assert_eq!(contract.venue, FuturesVenue::Cffex);
        assert_eq!(contract.contract, "IF0");

        let contract = parse_futures("NF_M2409").unwrap();
        assert_eq!(contract.venue, FuturesVenue::Dce);
    }

    #[test]
    fn test_plain_tickers_are_not_futures() {
        assert!(parse_futures("M").is_none());
        assert!(parse_futures("T").is_none());
        assert!(parse_futures("AAPL").is_none());
        assert!(parse_futures("RB24X").is_none());
    }

    #[test]
    fn test_venue_mismatch_is_rejected() {
        assert!(parse_futures("SHFE.IF2406").is_none());
    }
}
