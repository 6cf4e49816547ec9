//! Market data models
//!
//! - `data_kind` - The categories of data that can be requested ([`DataKind`])
//! - `request` - Typed requests ([`DataRequest`])
//! - `payload` - The payload union stored by the cache ([`MarketData`])
//! - `quote`, `history`, `fundamentals`, `profile`, `options`, `earnings`, `macro_data` -
//!   the individual payload types

mod data_kind;
mod earnings;
mod fundamentals;
mod history;
mod macro_data;
mod options;
mod payload;
mod profile;
mod quote;
mod request;
mod types;

pub use data_kind::DataKind;
pub use earnings::{Earnings, EarningsReport};
pub use fundamentals::Fundamentals;
pub use history::{HistoryRange, Interval, PriceBar, PriceSeries};
pub use macro_data::{macro_symbol, MacroObservation, MacroSeries, MACRO_SYMBOL_PREFIX};
pub use options::{OptionContract, OptionExpirations, OptionSide, OptionsChain};
pub use payload::{FromMarketData, MarketData};
pub use profile::CompanyProfile;
pub use quote::Quote;
pub use request::DataRequest;
pub use types::ProviderId;
