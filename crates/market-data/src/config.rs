//! Service configuration.
//!
//! Every tunable is a plain number so the struct deserializes from JSON, TOML
//! or environment-derived maps without custom duration parsing. Durations carry
//! their unit in the field name.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::models::DataKind;
use crate::provider::AdapterDescriptor;

/// Per-adapter overrides applied at registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub enabled: Option<bool>,
    pub priority: Option<u32>,
}

impl ProviderSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: Some(false),
            priority: None,
        }
    }

    pub fn with_priority(priority: u32) -> Self {
        Self {
            enabled: None,
            priority: Some(priority),
        }
    }

    pub(crate) fn apply(&self, mut descriptor: AdapterDescriptor) -> AdapterDescriptor {
        if let Some(enabled) = self.enabled {
            descriptor.enabled = enabled;
        }
        if let Some(priority) = self.priority {
            descriptor.priority = priority;
        }
        descriptor
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Maximum number of entries held in the in-process cache.
    pub l1_capacity: usize,

    /// How long a finished request keeps absorbing identical late arrivals.
    pub dedup_window_ms: u64,

    /// Caller-side bound on one facade call, including every failover attempt.
    pub request_timeout_ms: u64,

    /// Number of call records kept for introspection.
    pub call_log_capacity: usize,

    /// Added to a rate-limited adapter's priority while routing.
    pub rate_limit_penalty: u32,

    /// Back-off for rate limits that come without a retry hint.
    pub default_rate_limit_backoff_secs: u64,

    /// Per-kind TTL overrides, in seconds.
    pub ttl_secs: HashMap<DataKind, u64>,

    /// SQLite file backing the persistent cache. `None` keeps L2 in memory.
    pub persistent_cache_path: Option<PathBuf>,

    /// Period of the background compaction task, when one is wanted.
    pub compaction_interval_secs: Option<u64>,

    /// Overrides keyed by adapter name.
    pub providers: HashMap<String, ProviderSettings>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 1_000,
            dedup_window_ms: 500,
            request_timeout_ms: 30_000,
            call_log_capacity: 1_000,
            rate_limit_penalty: 1_000,
            default_rate_limit_backoff_secs: 60,
            ttl_secs: HashMap::new(),
            persistent_cache_path: None,
            compaction_interval_secs: None,
            providers: HashMap::new(),
        }
    }
}

impl MarketDataConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn default_rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.default_rate_limit_backoff_secs)
    }

    pub fn compaction_interval(&self) -> Option<Duration> {
        self.compaction_interval_secs.map(Duration::from_secs)
    }

    pub fn ttl_overrides(&self) -> HashMap<DataKind, Duration> {
        self.ttl_secs
            .iter()
            .map(|(kind, secs)| (*kind, Duration::from_secs(*secs)))
            .collect()
    }

    /// Settings for an adapter; names match case-insensitively.
    pub fn provider_settings(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name).or_else(|| {
            self.providers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, settings)| settings)
        })
    }

    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.l1_capacity == 0 {
            return Err(MarketDataError::Configuration(
                "l1_capacity must be at least 1".to_string(),
            ));
        }
        if self.call_log_capacity == 0 {
            return Err(MarketDataError::Configuration(
                "call_log_capacity must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(MarketDataError::Configuration(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.compaction_interval_secs == Some(0) {
            return Err(MarketDataError::Configuration(
                "compaction_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MarketDataConfig::default();
        assert_eq!(config.dedup_window(), Duration::from_millis(500));
        assert_eq!(config.rate_limit_penalty, 1_000);
        assert!(config.persistent_cache_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: MarketDataConfig = serde_json::from_str(
            r#"{
                "l1_capacity": 10,
                "ttl_secs": { "quote": 5 },
                "providers": { "YAHOO": { "enabled": false } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.l1_capacity, 10);
        assert_eq!(config.call_log_capacity, 1_000);
        assert_eq!(
            config.ttl_overrides().get(&DataKind::Quote),
            Some(&Duration::from_secs(5))
        );
        assert_eq!(config.provider_settings("yahoo"), Some(&ProviderSettings::disabled()));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = MarketDataConfig {
            l1_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MarketDataError::Configuration(_))
        ));
    }

    #[test]
    fn test_settings_apply() {
        let descriptor = AdapterDescriptor::new("YAHOO").priority(10);
        let descriptor = ProviderSettings::with_priority(1).apply(descriptor);
        assert_eq!(descriptor.priority, 1);
        assert!(descriptor.enabled);

        let descriptor = ProviderSettings::disabled().apply(descriptor);
        assert!(!descriptor.enabled);
        assert_eq!(descriptor.priority, 1);
    }
}
