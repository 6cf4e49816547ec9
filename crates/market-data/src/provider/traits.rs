//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data adapters implement.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::MarketDataError;
use crate::models::{
    CompanyProfile, DataRequest, Earnings, Fundamentals, HistoryRange, MacroSeries, MarketData,
    OptionExpirations, OptionsChain, PriceSeries, Quote,
};

use super::descriptor::AdapterDescriptor;

/// Trait for market data adapters.
///
/// Implement this trait to add support for a new market data source. Every
/// data method defaults to `NotSupported`; an adapter overrides the ones it
/// declares in [`descriptor`](Self::descriptor).
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quoteflow_market_data::provider::{AdapterDescriptor, MarketDataProvider};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn descriptor(&self) -> AdapterDescriptor {
///         AdapterDescriptor::new(self.id())
///             .kinds(&[DataKind::Quote])
///             .segments(&[Segment::UnitedStates])
///     }
///
///     async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this adapter.
    ///
    /// Should be a constant string like "YAHOO", "EASTMONEY", etc.
    /// Used for logging, health tracking and metrics.
    fn id(&self) -> &'static str;

    /// Capabilities, limits and health thresholds. Read once at registration.
    fn descriptor(&self) -> AdapterDescriptor;

    /// Finer-grained eligibility than the declared segments, e.g. an adapter
    /// covering China-A that cannot serve the Beijing exchange.
    fn supports_symbol(&self, symbol: &str) -> bool {
        let _ = symbol;
        true
    }

    /// Latest quote for a symbol.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let _ = symbol;
        Err(self.not_supported("quote"))
    }

    /// Historical bars for a symbol, ordered by timestamp ascending.
    async fn get_history(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<PriceSeries, MarketDataError> {
        let _ = (symbol, range);
        Err(self.not_supported("history"))
    }

    /// Valuation metrics and financial ratios.
    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, MarketDataError> {
        let _ = symbol;
        Err(self.not_supported("fundamentals"))
    }

    /// Descriptive company data.
    async fn get_company_info(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        let _ = symbol;
        Err(self.not_supported("company_info"))
    }

    /// Option chain for one expiration; `None` means the nearest one.
    async fn get_options_chain(
        &self,
        symbol: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<OptionsChain, MarketDataError> {
        let _ = (symbol, expiry);
        Err(self.not_supported("options_chain"))
    }

    /// Listed option expiration dates.
    async fn get_options_expirations(
        &self,
        symbol: &str,
    ) -> Result<OptionExpirations, MarketDataError> {
        let _ = symbol;
        Err(self.not_supported("options_expirations"))
    }

    /// Reported and estimated earnings per share.
    async fn get_earnings(&self, symbol: &str) -> Result<Earnings, MarketDataError> {
        let _ = symbol;
        Err(self.not_supported("earnings"))
    }

    /// Macro-economic indicator series by name (`CPI`, `REAL_GDP`, ...).
    async fn get_macro_indicator(&self, indicator: &str) -> Result<MacroSeries, MarketDataError> {
        let _ = indicator;
        Err(self.not_supported("macro_indicator"))
    }

    /// Serve a typed request by dispatching to the matching method.
    async fn fetch(&self, request: &DataRequest) -> Result<MarketData, MarketDataError> {
        let data = match request {
            DataRequest::Quote { symbol } => self.get_quote(symbol).await?.into(),
            DataRequest::History { symbol, range } => self.get_history(symbol, range).await?.into(),
            DataRequest::Fundamentals { symbol } => self.get_fundamentals(symbol).await?.into(),
            DataRequest::CompanyInfo { symbol } => self.get_company_info(symbol).await?.into(),
            DataRequest::OptionsChain { symbol, expiry } => {
                self.get_options_chain(symbol, *expiry).await?.into()
            }
            DataRequest::OptionsExpirations { symbol } => {
                self.get_options_expirations(symbol).await?.into()
            }
            DataRequest::Earnings { symbol } => self.get_earnings(symbol).await?.into(),
            DataRequest::MacroIndicator { indicator } => {
                self.get_macro_indicator(indicator).await?.into()
            }
        };
        Ok(data)
    }

    /// Cheap liveness probe. The default assumes the adapter is reachable.
    async fn health_check(&self) -> Result<(), MarketDataError> {
        Ok(())
    }

    #[doc(hidden)]
    fn not_supported(&self, operation: &str) -> MarketDataError {
        MarketDataError::NotSupported {
            operation: operation.to_string(),
            provider: self.id().to_string(),
        }
    }
}
