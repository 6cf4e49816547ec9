use std::collections::{BTreeMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use super::record::{serialize_millis, CallFilter, CallOutcome, CallRecord};

/// Latency distribution over a set of calls. All zero when the set is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyPercentiles {
    pub count: usize,
    #[serde(rename = "p50_ms", serialize_with = "serialize_millis")]
    pub p50: Duration,
    #[serde(rename = "p90_ms", serialize_with = "serialize_millis")]
    pub p90: Duration,
    #[serde(rename = "p95_ms", serialize_with = "serialize_millis")]
    pub p95: Duration,
    #[serde(rename = "p99_ms", serialize_with = "serialize_millis")]
    pub p99: Duration,
}

/// Aggregate counters since the recorder was created or reset.
///
/// Unlike the call log these are never evicted.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_calls: u64,
    pub by_outcome: BTreeMap<String, u64>,
    pub by_kind: BTreeMap<String, u64>,
    /// Calls served, keyed by the adapter that served them.
    pub by_adapter: BTreeMap<String, u64>,
    /// Share of calls answered from cache, 0.0 to 1.0.
    pub cache_hit_rate: f64,
    pub last_call_at: Option<DateTime<Utc>>,
    pub stats_since: DateTime<Utc>,
}

impl MetricsSummary {
    fn new() -> Self {
        Self {
            total_calls: 0,
            by_outcome: BTreeMap::new(),
            by_kind: BTreeMap::new(),
            by_adapter: BTreeMap::new(),
            cache_hit_rate: 0.0,
            last_call_at: None,
            stats_since: Utc::now(),
        }
    }

    pub fn count(&self, outcome: CallOutcome) -> u64 {
        self.by_outcome.get(outcome.as_str()).copied().unwrap_or(0)
    }
}

/// Nearest-rank percentile over an ascending slice. `p` is in percent.
pub(crate) fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

struct Inner {
    history: VecDeque<CallRecord>,
    next_id: u64,
    summary: MetricsSummary,
}

/// Fixed-capacity log of facade calls plus running totals.
///
/// When full, the oldest record is dropped first.
pub struct MetricsRecorder {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl MetricsRecorder {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(capacity),
                next_id: 1,
                summary: MetricsSummary::new(),
            }),
            capacity,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("Metrics recorder lock poisoned (read), recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("Metrics recorder lock poisoned (write), recovering");
            poisoned.into_inner()
        })
    }

    /// Append a record. Returns its id.
    pub fn record(&self, mut record: CallRecord) -> u64 {
        let mut inner = self.write();

        let id = inner.next_id;
        inner.next_id += 1;
        record.id = id;

        debug!(
            "Call #{} {} {} -> {} in {:?} (attempted {:?})",
            id, record.kind, record.symbol, record.outcome, record.latency, record.adapters_attempted
        );

        let summary = &mut inner.summary;
        summary.total_calls += 1;
        *summary
            .by_outcome
            .entry(record.outcome.as_str().to_string())
            .or_insert(0) += 1;
        *summary
            .by_kind
            .entry(record.kind.as_str().to_string())
            .or_insert(0) += 1;
        if let Some(adapter) = &record.adapter_used {
            *summary.by_adapter.entry(adapter.clone()).or_insert(0) += 1;
        }
        summary.cache_hit_rate = summary.count(CallOutcome::CacheHit) as f64 / summary.total_calls as f64;
        summary.last_call_at = Some(record.timestamp);

        if inner.history.len() >= self.capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(record);

        id
    }

    /// Matching records, newest first.
    pub fn recent_calls(&self, filter: &CallFilter) -> Vec<CallRecord> {
        let inner = self.read();
        inner
            .history
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Latency percentiles over the matching records still in the log.
    pub fn latency_percentiles(&self, filter: &CallFilter) -> LatencyPercentiles {
        let mut latencies: Vec<Duration> = self
            .recent_calls(filter)
            .into_iter()
            .map(|r| r.latency)
            .collect();
        latencies.sort_unstable();

        LatencyPercentiles {
            count: latencies.len(),
            p50: percentile(&latencies, 50.0),
            p90: percentile(&latencies, 90.0),
            p95: percentile(&latencies, 95.0),
            p99: percentile(&latencies, 99.0),
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        self.read().summary.clone()
    }

    pub fn len(&self) -> usize {
        self.read().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop the call log and restart the totals.
    pub fn reset(&self) {
        let mut inner = self.write();
        inner.history.clear();
        inner.summary = MetricsSummary::new();
    }
}
