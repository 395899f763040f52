//! Time-bounded SQLite cache shared by every external data source.
//!
//! Each data kind lives in its own database file with a single table keyed by
//! the natural identifier. Records are replaced wholesale on refresh and never
//! deleted; a stale record simply stops being returned by [`TtlCache::get`].

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod retry;
pub mod screener;

pub use retry::RetryPolicy;
pub use screener::{read_screener_csv, ScreenerCache, ALL_SCREENERS};

/// Payload encoding written by the current code. Rows from before the column
/// existed read back as NULL and are treated as JSON too.
const PAYLOAD_FORMAT_JSON: &str = "json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to prepare cache directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open cache database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to migrate cache table {table}: {source}")]
    Schema {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to serialize payload for {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("write of {key} to {table} failed after {attempts} attempt(s): {source}")]
    Write {
        table: &'static str,
        key: String,
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

/// Table layout for one data kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTable {
    pub table: &'static str,
    pub key_column: &'static str,
}

impl CacheTable {
    pub const FILINGS: CacheTable = CacheTable { table: "sec_cache", key_column: "cik" };
    pub const PRICES: CacheTable = CacheTable { table: "price_cache", key_column: "ticker" };
    pub const SCREENERS: CacheTable = CacheTable { table: "screener_cache", key_column: "screener_name" };
    pub const TICKER_MAP: CacheTable = CacheTable { table: "ticker_map_cache", key_column: "source" };
}

/// A stored payload with the time it was written
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord<T> {
    pub key: String,
    pub payload: T,
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheRecord<T> {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }

    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < max_age
    }
}

/// Keyed store with a freshness window
pub struct TtlCache<T> {
    pool: SqlitePool,
    layout: CacheTable,
    retry: RetryPolicy,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for TtlCache<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            layout: self.layout,
            retry: self.retry,
            _payload: PhantomData,
        }
    }
}

impl<T> TtlCache<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open (creating if needed) the cache file and its table
    pub async fn open(path: impl AsRef<Path>, layout: CacheTable) -> Result<Self, CacheError> {
        Self::open_with_retry(path, layout, RetryPolicy::default()).await
    }

    /// Open with an explicit storage retry policy. Connecting and every schema
    /// statement are retried on contention, like writes.
    pub async fn open_with_retry(
        path: impl AsRef<Path>,
        layout: CacheTable,
        retry: RetryPolicy,
    ) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Directory { path: parent.to_path_buf(), source })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(retry.lock_wait);

        let what = format!("open of {}", path.display());
        let pool = retry
            .run(&what, || {
                SqlitePoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(std::time::Duration::from_secs(30))
                    .connect_with(options.clone())
            })
            .await
            .map_err(|(source, _)| CacheError::Open { path: path.to_path_buf(), source })?;

        let cache = Self { pool, layout, retry, _payload: PhantomData };
        cache.migrate().await?;
        debug!("💾 Cache table {} ready at {}", layout.table, path.display());
        Ok(cache)
    }

    async fn migrate(&self) -> Result<(), CacheError> {
        let table = self.layout.table;
        let schema_err = |(source, _attempts): (sqlx::Error, u32)| CacheError::Schema { table, source };

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                {key} TEXT PRIMARY KEY,
                data TEXT,
                cached_at TEXT
            )
            "#,
            table = table,
            key = self.layout.key_column,
        );
        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_cached_at ON {table}(cached_at)",
            table = table
        );

        for (what, sql) in [("create table", &create_table), ("create index", &create_index)] {
            let what = format!("{} {}", what, table);
            self.retry
                .run(&what, || sqlx::query(sql).execute(&self.pool))
                .await
                .map_err(schema_err)?;
        }

        let what = format!("schema upgrade of {}", table);
        self.retry
            .run(&what, || self.ensure_column("payload_format", "TEXT"))
            .await
            .map_err(schema_err)?;
        Ok(())
    }

    /// Add an optional column when an older file lacks it
    async fn ensure_column(&self, column: &str, column_type: &str) -> Result<(), sqlx::Error> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", self.layout.table))
            .fetch_all(&self.pool)
            .await?;

        let exists = rows
            .iter()
            .any(|row| row.try_get::<String, _>("name").map(|n| n == column).unwrap_or(false));

        if !exists {
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                self.layout.table, column, column_type
            ))
            .execute(&self.pool)
            .await?;
            info!("🔧 Added column {} to {}", column, self.layout.table);
        }
        Ok(())
    }

    /// Return the payload only if it was stored less than `max_age` ago.
    ///
    /// Stale, missing, unreadable and corrupt records all read as a miss.
    pub async fn get(&self, key: &str, max_age: Duration) -> Option<T> {
        let record = self.get_stale(key).await?;
        if record.is_fresh(max_age, Utc::now()) {
            Some(record.payload)
        } else {
            debug!("⌛ {} entry for {} is stale (stored {})", self.layout.table, key, record.stored_at);
            None
        }
    }

    /// Return the record regardless of its age
    pub async fn get_stale(&self, key: &str) -> Option<CacheRecord<T>> {
        let row = sqlx::query(&format!(
            "SELECT {key}, data, cached_at FROM {table} WHERE {key} = ?",
            key = self.layout.key_column,
            table = self.layout.table,
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(Some(row)) => self.decode_row(&row),
            Ok(None) => None,
            Err(e) => {
                warn!("⚠️ {} read failed for {}: {}", self.layout.table, key, e);
                None
            }
        }
    }

    /// Atomic insert-or-replace, retried on storage contention
    pub async fn put(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let data = serde_json::to_string(value)
            .map_err(|source| CacheError::Serialize { key: key.to_string(), source })?;
        let stored_at = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT OR REPLACE INTO {table} ({key}, data, cached_at, payload_format) VALUES (?, ?, ?, ?)",
            table = self.layout.table,
            key = self.layout.key_column,
        );

        let what = format!("{} write for {}", self.layout.table, key);
        self.retry
            .run(&what, || {
                sqlx::query(&sql)
                    .bind(key)
                    .bind(data.as_str())
                    .bind(stored_at.as_str())
                    .bind(PAYLOAD_FORMAT_JSON)
                    .execute(&self.pool)
            })
            .await
            .map_err(|(source, attempts)| CacheError::Write {
                table: self.layout.table,
                key: key.to_string(),
                attempts,
                source,
            })?;

        debug!("💾 Stored {} entry for {}", self.layout.table, key);
        Ok(())
    }

    /// Every readable record stored on the given local calendar date
    pub async fn records_stored_on(&self, date: NaiveDate) -> Vec<CacheRecord<T>> {
        // Timestamps are UTC; a local day spans at most the neighbouring UTC dates
        let rows = sqlx::query(&format!(
            "SELECT {key}, data, cached_at FROM {table} WHERE substr(cached_at, 1, 10) BETWEEN ? AND ? ORDER BY {key}",
            key = self.layout.key_column,
            table = self.layout.table,
        ))
        .bind((date - Duration::days(1)).format("%Y-%m-%d").to_string())
        .bind((date + Duration::days(1)).format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| self.decode_row(row))
                .filter(|record| local_date(record.stored_at) == date)
                .collect(),
            Err(e) => {
                warn!("⚠️ {} scan for {} failed: {}", self.layout.table, date, e);
                Vec::new()
            }
        }
    }

    fn decode_row(&self, row: &sqlx::sqlite::SqliteRow) -> Option<CacheRecord<T>> {
        let key: String = row.try_get(0).ok()?;
        let data: Option<String> = match row.try_get(1) {
            Ok(data) => data,
            Err(e) => {
                warn!("⚠️ Unreadable {} payload for {}: {}", self.layout.table, key, e);
                return None;
            }
        };
        let cached_at: Option<String> = row.try_get(2).unwrap_or(None);

        let stored_at = match cached_at.as_deref().map(parse_timestamp) {
            Some(Ok(ts)) => ts,
            Some(Err(e)) => {
                warn!("⚠️ Corrupt {} timestamp for {}: {}", self.layout.table, key, e);
                return None;
            }
            None => {
                warn!("⚠️ {} entry for {} has no timestamp", self.layout.table, key);
                return None;
            }
        };

        let Some(data) = data else {
            warn!("⚠️ {} entry for {} has no payload", self.layout.table, key);
            return None;
        };

        match serde_json::from_str::<T>(&data) {
            Ok(payload) => Some(CacheRecord { key, payload, stored_at }),
            Err(e) => {
                warn!("⚠️ Corrupt {} payload for {}, treating as miss: {}", self.layout.table, key, e);
                None
            }
        }
    }

    pub fn layout(&self) -> CacheTable {
        self.layout
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Calendar day of a timestamp in the local time zone
pub fn local_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

/// RFC 3339, or a naive ISO 8601 timestamp read as UTC
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(e) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| e),
    }
}
