//! Persistent (L2) cache storage.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::warn;

use super::key::CacheKey;
use crate::errors::MarketDataError;
use crate::models::{DataKind, MarketData};

/// Longest lifetime an entry can be given.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A cached answer with its lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: MarketData,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, value: MarketData, ttl: Duration) -> Self {
        let stored_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl.min(MAX_TTL))
            .unwrap_or_else(|_| chrono::Duration::zero());
        let expires_at = stored_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            key,
            value,
            stored_at,
            expires_at,
        }
    }

    /// Expired entries are never served, even when still stored.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }
}

/// Slower storage consulted on an L1 miss.
///
/// Implementations are synchronous; they are expected to be local (a file
/// or memory), not a network service.
pub trait PersistentStore: Send + Sync {
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, MarketDataError>;

    fn store(&self, entry: &CacheEntry) -> Result<(), MarketDataError>;

    fn remove(&self, key: &CacheKey) -> Result<bool, MarketDataError>;

    /// Drop every entry for a symbol, limited to one kind when given.
    /// Returns the number removed.
    fn remove_symbol(&self, symbol: &str, kind: Option<DataKind>) -> Result<usize, MarketDataError>;

    /// Drop entries that expired before `now`. Returns the number removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, MarketDataError>;

    fn clear(&self) -> Result<(), MarketDataError>;

    fn len(&self) -> Result<usize, MarketDataError>;
}

/// In-process [`PersistentStore`]. Useful in tests and when no database file
/// is configured.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Memory store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, MarketDataError> {
        Ok(self.lock_entries().get(key).cloned())
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), MarketDataError> {
        self.lock_entries().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, MarketDataError> {
        Ok(self.lock_entries().remove(key).is_some())
    }

    fn remove_symbol(&self, symbol: &str, kind: Option<DataKind>) -> Result<usize, MarketDataError> {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|key, _| !key.matches(symbol, kind));
        Ok(before - entries.len())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, MarketDataError> {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    fn clear(&self) -> Result<(), MarketDataError> {
        self.lock_entries().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, MarketDataError> {
        Ok(self.lock_entries().len())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::Quote;

    fn entry(symbol: &str, kind: DataKind, ttl: Duration) -> CacheEntry {
        CacheEntry::new(
            CacheKey::new(kind, symbol, &[]),
            Quote::new(symbol, dec!(1), "TEST").into(),
            ttl,
        )
    }

    #[test]
    fn test_entry_expiry() {
        let entry = entry("AAPL", DataKind::Quote, Duration::from_secs(30));
        let now = entry.stored_at;
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + chrono::Duration::seconds(30)));
        assert_eq!(entry.remaining_ttl(now), Duration::from_secs(30));
        assert_eq!(
            entry.remaining_ttl(now + chrono::Duration::seconds(31)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let entry = entry("AAPL", DataKind::Quote, Duration::MAX);
        assert!(!entry.is_expired(Utc::now()));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        let quote = entry("AAPL", DataKind::Quote, Duration::from_secs(30));
        let fundamentals = entry("AAPL", DataKind::Fundamentals, Duration::from_secs(30));
        let other = entry("MSFT", DataKind::Quote, Duration::ZERO);

        store.store(&quote).unwrap();
        store.store(&fundamentals).unwrap();
        store.store(&other).unwrap();
        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(store.load(&quote.key).unwrap(), Some(quote.clone()));

        assert_eq!(store.purge_expired(Utc::now()).unwrap(), 1);
        assert_eq!(store.remove_symbol("AAPL", None).unwrap(), 2);
        assert_eq!(store.len().unwrap(), 0);
        assert!(!store.remove(&quote.key).unwrap());
    }
}
