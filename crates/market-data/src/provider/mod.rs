//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all adapters implement
//! - `AdapterDescriptor`: declared kinds, segments, limits and health thresholds
//! - Concrete adapters (Yahoo, Finnhub, Alpha Vantage, Eastmoney, Sina futures)
//!
//! Adapters receive the caller's normalized symbol and rebuild their own
//! spelling of it through [`crate::segment`]. They never decide routing,
//! caching or retries; those belong to the service.

mod descriptor;
pub(crate) mod http;
mod traits;

pub mod alpha_vantage;
pub mod eastmoney;
pub mod finnhub;
pub mod sina_futures;
pub mod yahoo;

pub use descriptor::{AdapterDescriptor, RateLimit};
pub use traits::MarketDataProvider;
