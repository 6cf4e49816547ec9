//! SQLite-backed [`PersistentStore`]. Payloads are stored as JSON.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};

use super::key::CacheKey;
use super::store::{CacheEntry, PersistentStore};
use crate::errors::MarketDataError;
use crate::models::{DataKind, MarketData};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS market_data_cache (
        cache_key  TEXT PRIMARY KEY NOT NULL,
        kind       TEXT NOT NULL,
        symbol     TEXT NOT NULL,
        payload    TEXT NOT NULL,
        stored_at  INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_market_data_cache_symbol ON market_data_cache (symbol);
    CREATE INDEX IF NOT EXISTS idx_market_data_cache_expires ON market_data_cache (expires_at);
";

fn storage_error(err: impl std::fmt::Display) -> MarketDataError {
    MarketDataError::Storage(err.to_string())
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MarketDataError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(storage_error)?;
        }
        let conn = Connection::open(path).map_err(storage_error)?;
        debug!("Opened persistent cache at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, MarketDataError> {
        Self::init(Connection::open_in_memory().map_err(storage_error)?)
    }

    fn init(conn: Connection) -> Result<Self, MarketDataError> {
        conn.execute_batch(SCHEMA).map_err(storage_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("SQLite cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl PersistentStore for SqliteStore {
    fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, MarketDataError> {
        let conn = self.lock_conn();
        let row = conn
            .query_row(
                "SELECT payload, stored_at, expires_at FROM market_data_cache WHERE cache_key = ?1",
                params![key.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(storage_error)?;

        let Some((payload, stored_at, expires_at)) = row else {
            return Ok(None);
        };
        let value: MarketData = serde_json::from_str(&payload)
            .map_err(|e| storage_error(format!("corrupt payload for {}: {}", key, e)))?;

        Ok(Some(CacheEntry {
            key: key.clone(),
            value,
            stored_at: from_millis(stored_at),
            expires_at: from_millis(expires_at),
        }))
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), MarketDataError> {
        let payload = serde_json::to_string(&entry.value).map_err(storage_error)?;
        self.lock_conn()
            .execute(
                "INSERT OR REPLACE INTO market_data_cache
                     (cache_key, kind, symbol, payload, stored_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.key.to_string(),
                    entry.key.kind().as_str(),
                    entry.key.symbol(),
                    payload,
                    entry.stored_at.timestamp_millis(),
                    entry.expires_at.timestamp_millis(),
                ],
            )
            .map_err(storage_error)?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, MarketDataError> {
        let removed = self
            .lock_conn()
            .execute(
                "DELETE FROM market_data_cache WHERE cache_key = ?1",
                params![key.to_string()],
            )
            .map_err(storage_error)?;
        Ok(removed > 0)
    }

    fn remove_symbol(&self, symbol: &str, kind: Option<DataKind>) -> Result<usize, MarketDataError> {
        let conn = self.lock_conn();
        let removed = match kind {
            Some(kind) => conn.execute(
                "DELETE FROM market_data_cache WHERE symbol = ?1 AND kind = ?2",
                params![symbol, kind.as_str()],
            ),
            None => conn.execute(
                "DELETE FROM market_data_cache WHERE symbol = ?1",
                params![symbol],
            ),
        };
        removed.map_err(storage_error)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, MarketDataError> {
        self.lock_conn()
            .execute(
                "DELETE FROM market_data_cache WHERE expires_at <= ?1",
                params![now.timestamp_millis()],
            )
            .map_err(storage_error)
    }

    fn clear(&self) -> Result<(), MarketDataError> {
        self.lock_conn()
            .execute("DELETE FROM market_data_cache", [])
            .map_err(storage_error)?;
        Ok(())
    }

    fn len(&self) -> Result<usize, MarketDataError> {
        let count: i64 = self
            .lock_conn()
            .query_row("SELECT COUNT(*) FROM market_data_cache", [], |row| {
                row.get(0)
            })
            .map_err(storage_error)?;
        Ok(count as usize)
    }
}
