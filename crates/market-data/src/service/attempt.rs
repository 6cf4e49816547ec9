//! The failover loop behind every cache miss.

use std::borrow::Cow;

use log::{debug, error, info, warn};

use super::ServiceInner;
use crate::cache::CacheKey;
use crate::errors::{FailureClass, MarketDataError};
use crate::metrics::CallOutcome;
use crate::models::{DataRequest, MarketData, ProviderId};
use crate::registry::{FetchDiagnostics, SkipReason};
use crate::segment;

/// Result of one trip through the candidate list, shared by every caller
/// coalesced onto it.
#[derive(Clone, Debug)]
pub(crate) struct FetchOutcome {
    pub data: Option<MarketData>,
    pub attempted: Vec<String>,
    pub used: Option<String>,
    pub outcome: CallOutcome,
    /// Set only for failures that must reach the caller.
    pub error: Option<MarketDataError>,
}

impl FetchOutcome {
    fn absent(diagnostics: &FetchDiagnostics, outcome: CallOutcome) -> Self {
        Self {
            data: None,
            attempted: attempted_names(diagnostics),
            used: None,
            outcome,
            error: None,
        }
    }
}

fn attempted_names(diagnostics: &FetchDiagnostics) -> Vec<String> {
    diagnostics
        .attempted()
        .into_iter()
        .map(|id| id.into_owned())
        .collect()
}

/// Try each candidate in order until one answers.
///
/// Every adapter is called at most once. Transient failures count against the
/// adapter's health, rate limits push it down the order, and not-found answers
/// move on without penalty. A fatal error stops the loop.
pub(crate) async fn run(inner: &ServiceInner, request: &DataRequest, key: &CacheKey) -> FetchOutcome {
    let kind = request.kind();
    let symbol = request.symbol();
    let segment = segment::detect(&symbol);
    let candidates = inner.registry.candidates(kind, segment, &symbol);
    let mut diagnostics = FetchDiagnostics::new();

    if candidates.is_empty() {
        info!("No adapter can serve {} {} ({})", kind, symbol, segment);
        return FetchOutcome::absent(&diagnostics, CallOutcome::Failure);
    }

    let health = inner.registry.health();
    let rate_limiter = inner.registry.rate_limiter();

    for (position, candidate) in candidates.iter().enumerate() {
        let name = candidate.name();
        let provider_id: ProviderId = Cow::Owned(name.to_string());

        if !rate_limiter.try_acquire(name) {
            let retry_in = rate_limiter.time_until_available(name);
            warn!("Local budget for '{}' exhausted, retry in {:?}", name, retry_in);
            health.record_rate_limited(name, Some(retry_in));
            diagnostics.record_skip(provider_id, SkipReason::BudgetExhausted { retry_in });
            continue;
        }

        debug!("Fetching {} {} from '{}'", kind, symbol, name);
        let result = match tokio::time::timeout(
            candidate.descriptor.request_timeout,
            candidate.provider.fetch(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MarketDataError::Timeout {
                provider: name.to_string(),
            }),
        };

        match result {
            Ok(data) if data.kind() != kind => {
                let mismatch = MarketDataError::PayloadMismatch {
                    expected: kind.to_string(),
                    actual: data.kind().to_string(),
                };
                error!("Adapter '{}' answered {} {}: {}", name, kind, symbol, mismatch);
                diagnostics.record_error(provider_id, mismatch.clone());
                return FetchOutcome {
                    error: Some(mismatch),
                    ..FetchOutcome::absent(&diagnostics, CallOutcome::Failure)
                };
            }
            Ok(data) => {
                health.record_success(name);
                let ttl = inner
                    .cache
                    .ttl_policy()
                    .resolve(kind, Some(&candidate.descriptor.ttl_overrides));
                inner.cache.put(key.clone(), data.clone(), ttl);

                diagnostics.record_success(provider_id);
                info!("Fetched {} {}: {}", kind, symbol, diagnostics.summary());

                let outcome = if position == 0 {
                    CallOutcome::Success
                } else {
                    CallOutcome::FallbackUsed
                };
                return FetchOutcome {
                    data: Some(data),
                    attempted: attempted_names(&diagnostics),
                    used: Some(name.to_string()),
                    outcome,
                    error: None,
                };
            }
            Err(e) => {
                match e.classify() {
                    FailureClass::Fatal => {
                        error!("Adapter '{}' failed fatally on {} {}: {}", name, kind, symbol, e);
                        diagnostics.record_error(provider_id, e.clone());
                        return FetchOutcome {
                            error: Some(e),
                            ..FetchOutcome::absent(&diagnostics, CallOutcome::Failure)
                        };
                    }
                    FailureClass::Transient => {
                        debug!("Adapter '{}' failed on {} {}: {}", name, kind, symbol, e);
                        health.record_failure(name, &e.to_string());
                    }
                    FailureClass::RateLimited => {
                        let retry_after = match &e {
                            MarketDataError::RateLimited { retry_after, .. } => *retry_after,
                            _ => None,
                        };
                        health.record_rate_limited(name, retry_after);
                    }
                    FailureClass::NotFound => {
                        debug!("Adapter '{}' has no {} for {}: {}", name, kind, symbol, e);
                        health.record_not_found(name);
                    }
                }
                diagnostics.record_error(provider_id, e);
            }
        }
    }

    let outcome = if diagnostics.all_rate_limited() {
        CallOutcome::RateLimited
    } else if diagnostics.all_timed_out() {
        CallOutcome::Timeout
    } else {
        CallOutcome::Failure
    };
    warn!(
        "All adapters failed for {} {}. Diagnostics: {}",
        kind,
        symbol,
        diagnostics.summary()
    );
    FetchOutcome::absent(&diagnostics, outcome)
}
