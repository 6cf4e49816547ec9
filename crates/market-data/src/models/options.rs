use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of an option contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSide {
    Call,
    Put,
}

/// A single listed option contract
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub contract_symbol: String,
    pub strike: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_volatility: Option<Decimal>,
    #[serde(default)]
    pub in_the_money: bool,
}

/// Calls and puts for one underlying and one expiration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionsChain {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub calls: Vec<OptionContract>,
    pub puts: Vec<OptionContract>,
    pub source: String,
}

impl OptionsChain {
    pub fn contracts(&self, side: OptionSide) -> &[OptionContract] {
        match side {
            OptionSide::Call => &self.calls,
            OptionSide::Put => &self.puts,
        }
    }

    /// Sorted, de-duplicated strikes across both sides.
    pub fn strikes(&self) -> Vec<Decimal> {
        let mut strikes: Vec<Decimal> = self
            .calls
            .iter()
            .chain(self.puts.iter())
            .map(|c| c.strike)
            .collect();
        strikes.sort();
        strikes.dedup();
        strikes
    }
}

/// Listed expiration dates for an underlying
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionExpirations {
    pub underlying: String,
    /// Ascending
    pub dates: Vec<NaiveDate>,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn contract(strike: Decimal) -> OptionContract {
        OptionContract {
            contract_symbol: format!("AAPL240119C{}", strike),
            strike,
            last_price: None,
            bid: None,
            ask: None,
            volume: None,
            open_interest: None,
            implied_volatility: None,
            in_the_money: false,
        }
    }

    #[test]
    fn test_strikes_merge_both_sides() {
        let chain = OptionsChain {
            underlying: "AAPL".to_string(),
            expiration: NaiveDate::from_ymd_opt(2024, 1, 19).unwrap(),
            calls: vec![contract(dec!(150)), contract(dec!(140))],
            puts: vec![contract(dec!(150)), contract(dec!(160))],
            source: "YAHOO".to_string(),
        };
        assert_eq!(chain.strikes(), vec![dec!(140), dec!(150), dec!(160)]);
        assert_eq!(chain.contracts(OptionSide::Put).len(), 2);
    }
}
