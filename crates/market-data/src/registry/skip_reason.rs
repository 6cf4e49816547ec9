//! Skip reason tracking for adapter selection diagnostics.

use std::fmt;
use std::time::Duration;

use crate::errors::MarketDataError;
use crate::models::{DataKind, ProviderId};
use crate::segment::Segment;

/// Why an adapter was not called for a request.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// Disabled in its descriptor or by configuration.
    Disabled,

    /// The adapter does not declare this data kind.
    KindNotSupported(DataKind),

    /// The adapter does not cover the symbol's segment.
    SegmentNotCovered(Segment),

    /// The adapter covers the segment but rejected this particular symbol.
    SymbolNotSupported,

    /// Too many consecutive failures; cooling down.
    Suspended { remaining: Duration },

    /// Local request budget spent; treated like an upstream rate limit.
    BudgetExhausted { retry_in: Duration },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::KindNotSupported(kind) => write!(f, "{} not supported", kind),
            Self::SegmentNotCovered(segment) => write!(f, "{} not covered", segment),
            Self::SymbolNotSupported => write!(f, "symbol not supported"),
            Self::Suspended { remaining } => write!(f, "suspended for {:?}", remaining),
            Self::BudgetExhausted { retry_in } => {
                write!(f, "local budget exhausted, retry in {:?}", retry_in)
            }
        }
    }
}

/// Record of a single adapter during a fetch.
#[derive(Clone, Debug)]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    pub skipped: Option<SkipReason>,
    pub error: Option<MarketDataError>,
    pub success: bool,
}

impl ProviderAttempt {
    /// Whether the adapter was actually called.
    pub fn was_called(&self) -> bool {
        self.skipped.is_none()
    }
}

/// Per-request record of which adapters were skipped, failed or succeeded.
#[derive(Clone, Debug, Default)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: Some(reason),
            error: None,
            success: false,
        });
    }

    pub fn record_error(&mut self, provider_id: ProviderId, error: MarketDataError) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: Some(error),
            success: false,
        });
    }

    pub fn record_success(&mut self, provider_id: ProviderId) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: None,
            success: true,
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no candidates".to_string();
        }
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.provider_id)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({})", a.provider_id, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({})", a.provider_id, err)
                } else {
                    format!("{}: UNKNOWN", a.provider_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    /// Adapters that were actually called, in order.
    pub fn attempted(&self) -> Vec<ProviderId> {
        self.attempts
            .iter()
            .filter(|a| a.was_called())
            .map(|a| a.provider_id.clone())
            .collect()
    }

    pub fn skip_reasons(&self) -> Vec<(&ProviderId, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.as_ref().map(|s| (&a.provider_id, s)))
            .collect()
    }

    pub fn errors(&self) -> Vec<(&ProviderId, &MarketDataError)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (&a.provider_id, e)))
            .collect()
    }

    /// True when at least one adapter was in play and every one of them was
    /// stopped by a rate limit, upstream or local.
    pub fn all_rate_limited(&self) -> bool {
        !self.attempts.is_empty()
            && self.attempts.iter().all(|a| {
                matches!(a.skipped, Some(SkipReason::BudgetExhausted { .. }))
                    || matches!(a.error, Some(MarketDataError::RateLimited { .. }))
            })
    }

    /// True when every adapter that was called timed out.
    pub fn all_timed_out(&self) -> bool {
        let mut called = self.attempts.iter().filter(|a| a.was_called()).peekable();
        called.peek().is_some()
            && called.all(|a| matches!(a.error, Some(MarketDataError::Timeout { .. })))
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    fn rate_limited(provider: &str) -> MarketDataError {
        MarketDataError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    }

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = FetchDiagnostics::new();
        diag.record_skip(
            Cow::Borrowed("YAHOO"),
            SkipReason::Suspended {
                remaining: Duration::from_secs(5),
            },
        );
        diag.record_error(
            Cow::Borrowed("FINNHUB"),
            MarketDataError::Timeout {
                provider: "FINNHUB".to_string(),
            },
        );
        diag.record_success(Cow::Borrowed("ALPHA_VANTAGE"));

        let summary = diag.summary();
        assert!(summary.contains("YAHOO: SKIPPED (suspended"));
        assert!(summary.contains("FINNHUB: ERROR (Timeout: FINNHUB)"));
        assert!(summary.contains("ALPHA_VANTAGE: SUCCESS"));
    }

    #[test]
    fn test_attempted_excludes_skips() {
        let mut diag = FetchDiagnostics::new();
        diag.record_error(Cow::Borrowed("A"), MarketDataError::not_found("A", "X"));
        diag.record_skip(
            Cow::Borrowed("B"),
            SkipReason::BudgetExhausted {
                retry_in: Duration::from_secs(1),
            },
        );
        diag.record_success(Cow::Borrowed("C"));

        assert_eq!(diag.attempted(), vec![Cow::Borrowed("A"), Cow::Borrowed("C")]);
        assert!(diag.has_success());
        assert_eq!(diag.skip_reasons().len(), 1);
        assert_eq!(diag.errors().len(), 1);
    }

    #[test]
    fn test_all_rate_limited() {
        let mut diag = FetchDiagnostics::new();
        assert!(!diag.all_rate_limited());

        diag.record_error(Cow::Borrowed("A"), rate_limited("A"));
        diag.record_skip(
            Cow::Borrowed("B"),
            SkipReason::BudgetExhausted {
                retry_in: Duration::from_secs(1),
            },
        );
        assert!(diag.all_rate_limited());

        diag.record_error(Cow::Borrowed("C"), MarketDataError::not_found("C", "X"));
        assert!(!diag.all_rate_limited());
    }

    #[test]
    fn test_all_timed_out() {
        let mut diag = FetchDiagnostics::new();
        assert!(!diag.all_timed_out());

        diag.record_error(
            Cow::Borrowed("A"),
            MarketDataError::Timeout {
                provider: "A".to_string(),
            },
        );
        assert!(diag.all_timed_out());

        diag.record_error(Cow::Borrowed("B"), rate_limited("B"));
        assert!(!diag.all_timed_out());
    }
}
