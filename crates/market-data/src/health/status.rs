use chrono::{DateTime, Utc};
use serde::Serialize;

use super::tracker::{AdapterHealth, HealthState};
use crate::errors::{FailureClass, MarketDataError};

/// Coarse adapter status reported to callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Healthy,
    /// Recent failures, or on probation after a suspension.
    Degraded,
    RateLimited,
    /// Suspended, or a health check could not reach it.
    Unavailable,
}

impl ProviderStatus {
    pub(crate) fn from_health(health: &AdapterHealth) -> Self {
        if health.state == HealthState::Suspended {
            Self::Unavailable
        } else if health.rate_limited_for.is_some() {
            Self::RateLimited
        } else if health.state == HealthState::Probationary || health.consecutive_failures > 0 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Status implied by the outcome of an adapter's own health check.
    pub fn from_check(result: &Result<(), MarketDataError>) -> Self {
        match result {
            Ok(()) => Self::Healthy,
            Err(err) => match err.classify() {
                FailureClass::RateLimited => Self::RateLimited,
                FailureClass::NotFound => Self::Degraded,
                FailureClass::Transient | FailureClass::Fatal => Self::Unavailable,
            },
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Status plus the details behind it, as returned by `provider_health()`.
#[derive(Clone, Debug, Serialize)]
pub struct ProviderHealth {
    pub status: ProviderStatus,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub cooldown_ms: u64,
    pub suspended_for_ms: Option<u64>,
    pub rate_limited_for_ms: Option<u64>,
}

impl ProviderHealth {
    pub(crate) fn new(status: ProviderStatus, health: AdapterHealth) -> Self {
        Self {
            status,
            state: health.state,
            consecutive_failures: health.consecutive_failures,
            last_success: health.last_success,
            last_failure: health.last_failure,
            last_error: health.last_error,
            cooldown_ms: health.current_cooldown.as_millis() as u64,
            suspended_for_ms: health.suspended_for.map(|d| d.as_millis() as u64),
            rate_limited_for_ms: health.rate_limited_for.map(|d| d.as_millis() as u64),
        }
    }
}
