//! Two-level cache for market data answers.
//!
//! - **L1**: bounded in-process `moka` cache with least-recently-used eviction
//! - **L2**: optional [`PersistentStore`] (SQLite or memory), consulted only
//!   on an L1 miss; hits are promoted into L1 with their remaining lifetime
//!
//! Expiry is lazy: an expired entry reads as a miss and is dropped on the
//! spot. [`MultiLevelCache::compact`] sweeps both levels and can run on a
//! timer via [`MultiLevelCache::spawn_compaction`].

mod key;
mod sqlite;
mod store;
mod ttl;

pub use key::CacheKey;
pub use sqlite::SqliteStore;
pub use store::{CacheEntry, MemoryStore, PersistentStore};
pub use ttl::TtlPolicy;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::Serialize;

use crate::models::{DataKind, MarketData};
use crate::segment::normalize_symbol;

/// Counters and sizes reported by [`MultiLevelCache::stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from either level.
    pub hits: u64,
    pub misses: u64,
    /// Subset of `hits` answered by L2.
    pub l2_hits: u64,
    /// L1 entries pushed out by capacity.
    pub evictions: u64,
    /// Entries found expired on read.
    pub expired: u64,
    pub l1_size: usize,
    pub l1_capacity: usize,
    /// `None` without an L2, or when it could not be counted.
    pub l2_size: Option<usize>,
}

/// What one compaction pass removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub l1_removed: usize,
    pub l2_removed: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    l2_hits: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

pub struct MultiLevelCache {
    l1: Cache<CacheKey, CacheEntry>,
    l1_capacity: usize,
    l2: Option<Arc<dyn PersistentStore>>,
    ttl: TtlPolicy,
    counters: Arc<Counters>,
}

impl MultiLevelCache {
    pub fn new(capacity: usize, ttl: TtlPolicy) -> Self {
        let counters = Arc::new(Counters::default());
        let listener_counters = Arc::clone(&counters);
        let l1 = Cache::builder()
            .max_capacity(capacity as u64)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |key: Arc<CacheKey>, _entry: CacheEntry, cause| {
                if matches!(cause, RemovalCause::Size) {
                    listener_counters.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache: evicted {} from L1", key);
                }
            })
            .build();

        Self {
            l1,
            l1_capacity: capacity,
            l2: None,
            ttl,
            counters,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.l2 = Some(store);
        self
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Insert into L1 and settle capacity right away, so the size bound and
    /// recency order hold as soon as `put` returns.
    fn insert_l1(&self, entry: CacheEntry) {
        self.l1.insert(entry.key.clone(), entry);
        self.l1.run_pending_tasks();
    }

    /// Remove every L1 entry `keep` rejects. Returns how many went.
    fn retain_l1(&self, keep: impl Fn(&CacheKey, &CacheEntry) -> bool) -> usize {
        let doomed: Vec<Arc<CacheKey>> = self
            .l1
            .iter()
            .filter(|(key, entry)| !keep(key, entry))
            .map(|(key, _)| key)
            .collect();
        let mut removed = 0;
        for key in doomed {
            if self.l1.remove(&*key).is_some() {
                removed += 1;
            }
        }
        self.l1.run_pending_tasks();
        removed
    }

    /// Cached value for `key`, if present and unexpired in either level.
    pub fn get(&self, key: &CacheKey) -> Option<MarketData> {
        let now = Utc::now();

        match self.l1.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value);
            }
            Some(_) => {
                self.l1.remove(key);
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }

        if let Some(store) = &self.l2 {
            match store.load(key) {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    debug!(
                        "Cache: L2 hit for {}, promoting with {:?} left",
                        key,
                        entry.remaining_ttl(now)
                    );
                    let value = entry.value.clone();
                    self.insert_l1(entry);
                    self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Ok(Some(_)) => {
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = store.remove(key) {
                        warn!("Cache: failed to drop expired L2 entry {}: {}", key, e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Cache: L2 read for {} failed, treating as miss: {}", key, e),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` in both levels for `ttl`.
    pub fn put(&self, key: CacheKey, value: MarketData, ttl: Duration) {
        let entry = CacheEntry::new(key, value, ttl);
        if let Some(store) = &self.l2 {
            if let Err(e) = store.store(&entry) {
                warn!("Cache: L2 write for {} failed: {}", entry.key, e);
            }
        }
        self.insert_l1(entry);
    }

    /// Drop one key from both levels. Returns whether anything was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut removed = self.l1.remove(key).is_some();
        if let Some(store) = &self.l2 {
            match store.remove(key) {
                Ok(hit) => removed |= hit,
                Err(e) => warn!("Cache: L2 invalidate for {} failed: {}", key, e),
            }
        }
        removed
    }

    /// Drop every entry for a symbol, or only those of `kind` when given.
    /// Returns the number of L1 and L2 rows removed.
    pub fn invalidate_symbol(&self, symbol: &str, kind: Option<DataKind>) -> usize {
        let symbol = normalize_symbol(symbol);
        let mut removed = self.retain_l1(|key, _| !key.matches(&symbol, kind));
        if let Some(store) = &self.l2 {
            match store.remove_symbol(&symbol, kind) {
                Ok(count) => removed += count,
                Err(e) => warn!("Cache: L2 invalidate for symbol {} failed: {}", symbol, e),
            }
        }
        debug!("Cache: invalidated {} entries for {}", removed, symbol);
        removed
    }

    pub fn clear(&self) {
        self.retain_l1(|_, _| false);
        if let Some(store) = &self.l2 {
            if let Err(e) = store.clear() {
                warn!("Cache: L2 clear failed: {}", e);
            }
        }
        info!("Cache: cleared");
    }

    /// Remove expired entries from both levels.
    pub fn compact(&self) -> CompactionReport {
        let now = Utc::now();
        let l1_removed = self.retain_l1(|_, entry| !entry.is_expired(now));
        let l2_removed = match &self.l2 {
            Some(store) => store.purge_expired(now).unwrap_or_else(|e| {
                warn!("Cache: L2 compaction failed: {}", e);
                0
            }),
            None => 0,
        };
        if l1_removed + l2_removed > 0 {
            debug!(
                "Cache: compaction removed {} L1 and {} L2 entries",
                l1_removed, l2_removed
            );
        }
        CompactionReport {
            l1_removed,
            l2_removed,
        }
    }

    /// Run [`compact`](Self::compact) every `interval` until the cache is dropped.
    pub fn spawn_compaction(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.compact();
                    }
                    None => break,
                }
            }
            debug!("Cache: compaction task stopped");
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.l1.run_pending_tasks();
        let l1_size = self.l1.entry_count() as usize;
        let l2_size = self.l2.as_ref().and_then(|store| store.len().ok());
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            l1_size,
            l1_capacity: self.l1_capacity,
            l2_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::errors::MarketDataError;
    use crate::models::Quote;

    fn key(symbol: &str) -> CacheKey {
        CacheKey::new(DataKind::Quote, symbol, &[])
    }

    fn quote(symbol: &str, price: rust_decimal::Decimal) -> MarketData {
        let mut quote = Quote::new(symbol, price, "TEST");
        quote.timestamp = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        quote.into()
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_put_then_get() {
        let cache = MultiLevelCache::new(10, TtlPolicy::default());
        cache.put(key("X"), quote("X", dec!(101.5)), MINUTE);

        assert_eq!(cache.get(&key("X")), Some(quote("X", dec!(101.5))));
        assert_eq!(cache.get(&key("Y")), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.l1_size, 1);
        assert_eq!(stats.l2_size, None);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = MultiLevelCache::new(10, TtlPolicy::default());
        cache.put(key("X"), quote("X", dec!(1)), Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.get(&key("X")), None);
        let stats = cache.stats();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.l1_size, 0);
    }

    #[test]
    fn test_lru_eviction_respects_reads() {
        let cache = MultiLevelCache::new(2, TtlPolicy::default());
        cache.put(key("A"), quote("A", dec!(1)), MINUTE);
        cache.put(key("B"), quote("B", dec!(2)), MINUTE);
        assert!(cache.get(&key("A")).is_some());
        cache.put(key("C"), quote("C", dec!(3)), MINUTE);

        assert!(cache.get(&key("B")).is_none());
        assert!(cache.get(&key("A")).is_some());
        assert!(cache.get(&key("C")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_l2_hit_is_promoted() {
        let store = Arc::new(MemoryStore::new());
        let cache = MultiLevelCache::new(1, TtlPolicy::default()).with_store(store.clone());

        cache.put(key("A"), quote("A", dec!(1)), MINUTE);
        cache.put(key("B"), quote("B", dec!(2)), MINUTE); // evicts A from L1

        assert_eq!(cache.get(&key("A")), Some(quote("A", dec!(1))));
        let stats = cache.stats();
        assert_eq!(stats.l2_hits, 1);
        assert_eq!(stats.l2_size, Some(2));

        // A is back in L1 now, so B was pushed out to make room.
        assert_eq!(cache.get(&key("A")), Some(quote("A", dec!(1))));
        assert_eq!(cache.stats().l2_hits, 1);
    }

    #[test]
    fn test_promotion_keeps_remaining_ttl() {
        let store = Arc::new(MemoryStore::new());
        let entry = CacheEntry {
            key: key("A"),
            value: quote("A", dec!(1)),
            stored_at: Utc::now() - chrono::Duration::seconds(50),
            expires_at: Utc::now() + chrono::Duration::milliseconds(30),
        };
        store.store(&entry).unwrap();
        let cache = MultiLevelCache::new(4, TtlPolicy::default()).with_store(store);

        assert!(cache.get(&key("A")).is_some());
        std::thread::sleep(Duration::from_millis(50));
        assert!(cache.get(&key("A")).is_none());
    }

    struct BrokenStore;

    impl PersistentStore for BrokenStore {
        fn load(&self, _: &CacheKey) -> Result<Option<CacheEntry>, MarketDataError> {
            Err(MarketDataError::Storage("disk gone".to_string()))
        }
        fn store(&self, _: &CacheEntry) -> Result<(), MarketDataError> {
            Err(MarketDataError::Storage("disk gone".to_string()))
        }
        fn remove(&self, _: &CacheKey) -> Result<bool, MarketDataError> {
            Err(MarketDataError::Storage("disk gone".to_string()))
        }
        fn remove_symbol(&self, _: &str, _: Option<DataKind>) -> Result<usize, MarketDataError> {
            Err(MarketDataError::Storage("disk gone".to_string()))
        }
        fn purge_expired(&self, _: DateTime<Utc>) -> Result<usize, MarketDataError> {
            Err(MarketDataError::Storage("disk gone".to_string()))
        }
        fn clear(&self) -> Result<(), MarketDataError> {
            Err(MarketDataError::Storage("disk gone".to_string()))
        }
        fn len(&self) -> Result<usize, MarketDataError> {
            Err(MarketDataError::Storage("disk gone".to_string()))
        }
    }

    #[test]
    fn test_broken_l2_degrades_to_l1() {
        let cache = MultiLevelCache::new(4, TtlPolicy::default()).with_store(Arc::new(BrokenStore));

        cache.put(key("A"), quote("A", dec!(1)), MINUTE);
        assert!(cache.get(&key("A")).is_some());
        assert!(cache.get(&key("B")).is_none());
        assert_eq!(cache.compact(), CompactionReport::default());
        assert_eq!(cache.stats().l2_size, None);
    }

    #[test]
    fn test_invalidation() {
        let store = Arc::new(MemoryStore::new());
        let cache = MultiLevelCache::new(10, TtlPolicy::default()).with_store(store.clone());
        let fundamentals = CacheKey::new(DataKind::Fundamentals, "AAPL", &[]);

        cache.put(key("AAPL"), quote("AAPL", dec!(1)), MINUTE);
        cache.put(fundamentals.clone(), quote("AAPL", dec!(1)), MINUTE);
        cache.put(key("MSFT"), quote("MSFT", dec!(1)), MINUTE);

        assert!(cache.invalidate(&key("MSFT")));
        assert!(!cache.invalidate(&key("MSFT")));
        assert_eq!(cache.invalidate_symbol("aapl", Some(DataKind::Quote)), 2);
        assert!(cache.get(&fundamentals).is_some());
        assert_eq!(cache.invalidate_symbol("AAPL", None), 2);
        assert!(cache.get(&fundamentals).is_none());
        assert_eq!(store.len().unwrap(), 0);

        cache.put(key("AAPL"), quote("AAPL", dec!(1)), MINUTE);
        cache.clear();
        assert_eq!(cache.stats().l1_size, 0);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_compact_removes_expired() {
        let store = Arc::new(MemoryStore::new());
        let cache = MultiLevelCache::new(10, TtlPolicy::default()).with_store(store);

        cache.put(key("A"), quote("A", dec!(1)), Duration::ZERO);
        cache.put(key("B"), quote("B", dec!(1)), MINUTE);

        assert_eq!(
            cache.compact(),
            CompactionReport {
                l1_removed: 1,
                l2_removed: 1,
            }
        );
        assert_eq!(cache.stats().l1_size, 1);
    }

    #[tokio::test]
    async fn test_compaction_task_sweeps() {
        let cache = Arc::new(MultiLevelCache::new(10, TtlPolicy::default()));
        cache.put(key("A"), quote("A", dec!(1)), Duration::from_millis(5));

        let handle = cache.spawn_compaction(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.stats().l1_size, 0);

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task stops once the cache is gone")
            .unwrap();
    }
}
