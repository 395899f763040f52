//! TTL cache against real SQLite files

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Local, Utc};
use pretty_assertions::assert_eq;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, Row, SqliteConnection, SqlitePool};
use std::time::Duration as StdDuration;
use tempfile::TempDir;

use crate::common::logging::{init_test_logging, log_test_step};
use crate::common::temp_db_path;
use stock_scorecard::cache::{CacheError, CacheTable, RetryPolicy, TtlCache};
use stock_scorecard::models::PriceBar;

async fn price_cache(dir: &TempDir) -> TtlCache<Vec<PriceBar>> {
    TtlCache::open(temp_db_path(dir, "price_cache.db"), CacheTable::PRICES)
        .await
        .expect("Failed to open cache")
}

fn bars() -> Vec<PriceBar> {
    vec![PriceBar {
        date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        open: 10.0,
        high: 11.0,
        low: 9.5,
        close: 10.5,
        volume: Some(42),
    }]
}

#[tokio::test]
async fn test_round_trip_within_window() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let cache = price_cache(&dir).await;

    cache.put("KO", &bars()).await.unwrap();
    assert_eq!(cache.get("KO", Duration::days(1)).await, Some(bars()));
    assert_eq!(cache.get("PEP", Duration::days(1)).await, None);
}

#[tokio::test]
async fn test_expired_record_reads_as_miss_but_stays() {
    let dir = TempDir::new().unwrap();
    let cache = price_cache(&dir).await;
    cache.put("KO", &bars()).await.unwrap();

    // A zero window makes every record stale
    assert_eq!(cache.get("KO", Duration::zero()).await, None);

    let record = cache.get_stale("KO").await.expect("record should still be stored");
    assert_eq!(record.payload, bars());
    assert!(record.stored_at <= Utc::now());
}

#[tokio::test]
async fn test_put_replaces_whole_payload() {
    let dir = TempDir::new().unwrap();
    let cache = price_cache(&dir).await;

    cache.put("KO", &bars()).await.unwrap();
    cache.put("KO", &Vec::new()).await.unwrap();
    assert_eq!(cache.get("KO", Duration::days(1)).await, Some(Vec::new()));

    let count: i64 = sqlx::query("SELECT COUNT(*) FROM price_cache")
        .fetch_one(cache.pool())
        .await
        .unwrap()
        .get(0);
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_corrupt_payload_is_a_miss() {
    init_test_logging();
    log_test_step("Writing a corrupt row behind the cache's back");
    let dir = TempDir::new().unwrap();
    let cache = price_cache(&dir).await;

    sqlx::query("INSERT INTO price_cache (ticker, data, cached_at) VALUES (?, ?, ?)")
        .bind("BAD")
        .bind("{not json")
        .bind(Utc::now().to_rfc3339())
        .execute(cache.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO price_cache (ticker, data, cached_at) VALUES (?, ?, ?)")
        .bind("WHEN")
        .bind("[]")
        .bind("not a timestamp")
        .execute(cache.pool())
        .await
        .unwrap();

    assert_eq!(cache.get("BAD", Duration::days(1)).await, None);
    assert_eq!(cache.get("WHEN", Duration::days(1)).await, None);

    // A fresh write recovers the key
    cache.put("BAD", &bars()).await.unwrap();
    assert_eq!(cache.get("BAD", Duration::days(1)).await, Some(bars()));
}

#[tokio::test]
async fn test_opening_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b").join("sec_cache.db");

    let cache: TtlCache<serde_json::Value> = TtlCache::open(&nested, CacheTable::FILINGS).await.unwrap();
    cache.put("0000320193", &serde_json::json!({"facts": {}})).await.unwrap();
    assert!(nested.exists());

    // Reopening is idempotent
    let reopened: TtlCache<serde_json::Value> = TtlCache::open(&nested, CacheTable::FILINGS).await.unwrap();
    assert!(reopened.get("0000320193", Duration::days(7)).await.is_some());
}

#[tokio::test]
async fn test_older_table_gains_optional_column() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "sec_cache.db");

    // Table as written before the payload_format column existed
    let legacy = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path).create_if_missing(true))
        .await
        .unwrap();
    sqlx::query("CREATE TABLE sec_cache (cik TEXT PRIMARY KEY, data TEXT, cached_at TEXT)")
        .execute(&legacy)
        .await
        .unwrap();
    sqlx::query("INSERT INTO sec_cache (cik, data, cached_at) VALUES ('0000000001', '{\"facts\": {}}', ?)")
        .bind(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
        .execute(&legacy)
        .await
        .unwrap();
    legacy.close().await;

    let cache: TtlCache<serde_json::Value> = TtlCache::open(&path, CacheTable::FILINGS).await.unwrap();
    assert!(cache.get("0000000001", Duration::days(7)).await.is_some());

    let columns: Vec<String> = sqlx::query("PRAGMA table_info(sec_cache)")
        .fetch_all(cache.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();
    assert!(columns.contains(&"payload_format".to_string()));

    cache.put("0000000002", &serde_json::json!({})).await.unwrap();
    assert!(cache.get("0000000002", Duration::days(7)).await.is_some());
}

#[tokio::test]
async fn test_records_stored_on_filters_by_date() {
    let dir = TempDir::new().unwrap();
    let cache = price_cache(&dir).await;
    cache.put("KO", &bars()).await.unwrap();

    sqlx::query("INSERT INTO price_cache (ticker, data, cached_at) VALUES ('OLD', '[]', '2020-01-02T10:00:00+00:00')")
        .execute(cache.pool())
        .await
        .unwrap();

    let today = cache.records_stored_on(Local::now().date_naive()).await;
    assert_eq!(today.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), vec!["KO"]);

    // Dates are local calendar days
    let old_day = DateTime::parse_from_rfc3339("2020-01-02T10:00:00+00:00")
        .unwrap()
        .with_timezone(&Local)
        .date_naive();
    let old = cache.records_stored_on(old_day).await;
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].key, "OLD");
}

#[tokio::test]
async fn test_concurrent_writers_share_one_file() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "price_cache.db");
    let policy = RetryPolicy::new(3, StdDuration::from_millis(10));

    let first: TtlCache<Vec<PriceBar>> = TtlCache::open_with_retry(&path, CacheTable::PRICES, policy).await.unwrap();
    let second: TtlCache<Vec<PriceBar>> = TtlCache::open_with_retry(&path, CacheTable::PRICES, policy).await.unwrap();

    let writes = (0..20).map(|i| {
        let cache = if i % 2 == 0 { first.clone() } else { second.clone() };
        tokio::spawn(async move { cache.put(&format!("T{}", i), &bars()).await })
    });
    for handle in writes.collect::<Vec<_>>() {
        handle.await.unwrap().unwrap();
    }

    for i in 0..20 {
        assert!(first.get(&format!("T{}", i), Duration::days(1)).await.is_some());
    }
}

/// Legacy filings table held under a write lock by another connection
async fn locked_legacy_table(path: &std::path::Path) -> SqliteConnection {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let mut holder = SqliteConnection::connect_with(&options).await.unwrap();
    sqlx::query("CREATE TABLE sec_cache (cik TEXT PRIMARY KEY, data TEXT, cached_at TEXT)")
        .execute(&mut holder)
        .await
        .unwrap();
    sqlx::query("BEGIN EXCLUSIVE").execute(&mut holder).await.unwrap();
    holder
}

#[tokio::test]
async fn test_open_retries_schema_upgrade_behind_a_write_lock() {
    init_test_logging();
    log_test_step("Opening while another connection holds the write lock");
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "sec_cache.db");
    let mut holder = locked_legacy_table(&path).await;

    let release = tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(300)).await;
        sqlx::query("COMMIT").execute(&mut holder).await.unwrap();
        holder
    });

    // No busy wait inside an attempt, so only the policy's retries can get past the lock
    let policy = RetryPolicy::new(40, StdDuration::from_millis(50)).with_lock_wait(StdDuration::ZERO);
    let cache: TtlCache<serde_json::Value> = TtlCache::open_with_retry(&path, CacheTable::FILINGS, policy)
        .await
        .expect("open should succeed once the lock is released");
    release.await.unwrap().close().await.unwrap();

    cache.put("0000000001", &serde_json::json!({})).await.unwrap();
    assert!(cache.get("0000000001", Duration::days(7)).await.is_some());
}

#[tokio::test]
async fn test_open_gives_up_when_lock_outlasts_retries() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir, "sec_cache.db");
    let holder = locked_legacy_table(&path).await;

    let policy = RetryPolicy::new(2, StdDuration::from_millis(10)).with_lock_wait(StdDuration::ZERO);
    let err = match TtlCache::<serde_json::Value>::open_with_retry(&path, CacheTable::FILINGS, policy).await {
        Ok(_) => panic!("open should fail while the lock is held"),
        Err(e) => e,
    };
    assert_matches!(err, CacheError::Schema { table: "sec_cache", .. } | CacheError::Open { .. });

    holder.close().await.unwrap();
}
