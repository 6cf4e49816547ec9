//! Error types and failure classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`FailureClass`]: Classification that drives failover and health tracking

mod retry;

pub use retry::FailureClass;

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during market data operations.
///
/// The enum is `Clone` so a single outcome can be handed to every caller
/// coalesced onto the same in-flight request.
///
/// Each variant is classified into a [`FailureClass`] via [`classify`](Self::classify),
/// which determines how the service reacts when an adapter returns it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// Network or HTTP level failure talking to the provider.
    #[error("Transport error: {provider} - {message}")]
    Transport {
        /// The provider that failed
        provider: String,
        /// Description of the failure
        message: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider does not know the requested instrument.
    #[error("Not found: {symbol} ({provider})")]
    NotFound {
        /// The provider that reported the miss
        provider: String,
        /// The symbol that was requested
        symbol: String,
    },

    /// The provider signalled that a quota was exhausted (HTTP 429, quota notes, ...).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
        /// Back-off hint from the provider, if it sent one
        retry_after: Option<Duration>,
    },

    /// The provider answered with a body we could not interpret.
    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse {
        /// The provider that returned the body
        provider: String,
        /// What went wrong while parsing
        message: String,
    },

    /// The adapter does not implement the requested operation.
    #[error("Operation '{operation}' not supported by provider '{provider}'")]
    NotSupported {
        /// The operation (data kind) that was requested
        operation: String,
        /// The provider that lacks it
        provider: String,
    },

    /// Every candidate was tried (or none existed) and nothing produced data.
    #[error("No data available")]
    NoDataAvailable,

    /// Persistent cache failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration or wiring.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An adapter answered a request with a payload of another data kind.
    #[error("Payload mismatch: expected {expected}, got {actual}")]
    PayloadMismatch {
        /// The data kind that was requested
        expected: String,
        /// The data kind that came back
        actual: String,
    },
}

impl MarketDataError {
    /// Returns the failure classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use quoteflow_market_data::errors::{FailureClass, MarketDataError};
    ///
    /// let error = MarketDataError::RateLimited { provider: "YAHOO".to_string(), retry_after: None };
    /// assert_eq!(error.classify(), FailureClass::RateLimited);
    ///
    /// let error = MarketDataError::Configuration("unknown data kind".to_string());
    /// assert_eq!(error.classify(), FailureClass::Fatal);
    /// ```
    pub fn classify(&self) -> FailureClass {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::MalformedResponse { .. } => {
                FailureClass::Transient
            }

            Self::RateLimited { .. } => FailureClass::RateLimited,

            Self::NotFound { .. } | Self::NotSupported { .. } | Self::NoDataAvailable => {
                FailureClass::NotFound
            }

            // A broken local cache is an environmental condition, never a caller fault.
            Self::Storage(_) => FailureClass::Transient,

            Self::Configuration(_) | Self::PayloadMismatch { .. } => FailureClass::Fatal,
        }
    }

    /// The provider this error is attributed to, when there is one.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Transport { provider, .. }
            | Self::Timeout { provider }
            | Self::NotFound { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::NotSupported { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Shorthand for a malformed-response error.
    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a not-found error.
    pub fn not_found(provider: &str, symbol: impl Into<String>) -> Self {
        Self::NotFound {
            provider: provider.to_string(),
            symbol: symbol.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_is_transient() {
        let error = MarketDataError::Transport {
            provider: "YAHOO".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(error.classify(), FailureClass::Transient);
    }

    #[test]
    fn test_timeout_is_transient() {
        let error = MarketDataError::Timeout {
            provider: "ALPHA_VANTAGE".to_string(),
        };
        assert_eq!(error.classify(), FailureClass::Transient);
    }

    #[test]
    fn test_malformed_is_transient() {
        let error = MarketDataError::malformed("FINNHUB", "expected object");
        assert_eq!(error.classify(), FailureClass::Transient);
    }

    #[test]
    fn test_rate_limited_is_its_own_class() {
        let error = MarketDataError::RateLimited {
            provider: "YAHOO".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(error.classify(), FailureClass::RateLimited);
    }

    #[test]
    fn test_not_found_and_not_supported_skip_without_penalty() {
        assert_eq!(
            MarketDataError::not_found("YAHOO", "ZZZZ").classify(),
            FailureClass::NotFound
        );
        let error = MarketDataError::NotSupported {
            operation: "earnings".to_string(),
            provider: "EASTMONEY".to_string(),
        };
        assert_eq!(error.classify(), FailureClass::NotFound);
    }

    #[test]
    fn test_configuration_errors_are_fatal() {
        assert_eq!(
            MarketDataError::Configuration("bad".to_string()).classify(),
            FailureClass::Fatal
        );
        let error = MarketDataError::PayloadMismatch {
            expected: "quote".to_string(),
            actual: "history".to_string(),
        };
        assert_eq!(error.classify(), FailureClass::Fatal);
    }

    #[test]
    fn test_provider_attribution() {
        let error = MarketDataError::not_found("EASTMONEY", "600000");
        assert_eq!(error.provider(), Some("EASTMONEY"));
        assert_eq!(MarketDataError::NoDataAvailable.provider(), None);
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::not_found("YAHOO", "INVALID");
        assert_eq!(format!("{}", error), "Not found: INVALID (YAHOO)");

        let error = MarketDataError::RateLimited {
            provider: "YAHOO".to_string(),
            retry_after: None,
        };
        assert_eq!(format!("{}", error), "Rate limited: YAHOO");

        let error = MarketDataError::Transport {
            provider: "ALPHA_VANTAGE".to_string(),
            message: "HTTP 502".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Transport error: ALPHA_VANTAGE - HTTP 502"
        );
    }
}
