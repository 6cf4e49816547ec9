//! HTTP plumbing shared by the adapters.
//!
//! Maps transport failures, timeouts and quota responses onto
//! [`MarketDataError`] so every adapter classifies them the same way.

use std::time::Duration;

use num_traits::FromPrimitive;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::MarketDataError;

pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Client with a transport-level timeout. The service applies the
/// per-adapter `request_timeout` on top of this.
pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Send a request and return the body of a successful response.
///
/// - timeouts become `Timeout`
/// - 429 and 403 become `RateLimited` with the `Retry-After` hint when present
/// - 404 becomes `NotFound` for `symbol`
/// - any other non-success status or transport failure becomes `Transport`
pub(crate) async fn send(
    provider: &str,
    symbol: &str,
    request: RequestBuilder,
) -> Result<String, MarketDataError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            MarketDataError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            MarketDataError::Transport {
                provider: provider.to_string(),
                message: format!("Request failed: {}", e),
            }
        }
    })?;

    let status = response.status();
    debug!("{} responded {} for {}", provider, status, symbol);

    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(MarketDataError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        });
    }

    if status == StatusCode::NOT_FOUND {
        return Err(MarketDataError::not_found(provider, symbol));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MarketDataError::Transport {
            provider: provider.to_string(),
            message: format!("HTTP {} - {}", status, truncate(&body, 200)),
        });
    }

    response.text().await.map_err(|e| MarketDataError::Transport {
        provider: provider.to_string(),
        message: format!("Failed to read response: {}", e),
    })
}

/// Deserialize a JSON body, reporting failures as `MalformedResponse`.
pub(crate) fn parse_json<T: DeserializeOwned>(
    provider: &str,
    what: &str,
    body: &str,
) -> Result<T, MarketDataError> {
    serde_json::from_str(body).map_err(|e| {
        MarketDataError::malformed(provider, format!("Failed to parse {} response: {}", what, e))
    })
}

/// `Retry-After` in its delta-seconds form. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Finite floats only; providers use NaN and infinities as "no value".
pub(crate) fn decimal(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

/// Decimal from a provider string, treating "None", "-" and empty as absent.
pub(crate) fn decimal_str(value: &str) -> Option<Decimal> {
    let value = value.trim().trim_end_matches('%');
    match value {
        "" | "-" | "None" | "null" | "N/A" => None,
        v => v.parse::<Decimal>().ok(),
    }
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
