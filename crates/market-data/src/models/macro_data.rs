use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Prefix marking a macro-economic pseudo-symbol (`ECON:CPI`)
pub const MACRO_SYMBOL_PREFIX: &str = "ECON:";

/// Pseudo-symbol for a macro indicator name.
pub fn macro_symbol(indicator: &str) -> String {
    format!("{}{}", MACRO_SYMBOL_PREFIX, indicator.trim().to_uppercase())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MacroObservation {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Time series for a macro-economic indicator (CPI, GDP, ...)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MacroSeries {
    pub indicator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Oldest first
    pub observations: Vec<MacroObservation>,
    pub source: String,
}

impl MacroSeries {
    pub fn latest(&self) -> Option<&MacroObservation> {
        self.observations.last()
    }
}
