//! Screener membership lists on top of the generic TTL cache

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{CacheError, CacheTable, TtlCache};
use crate::models::ScreenerRow;

/// Screener name that selects every screener stored on a date
pub const ALL_SCREENERS: &str = "all";

#[derive(Clone)]
pub struct ScreenerCache {
    cache: TtlCache<Vec<ScreenerRow>>,
    ttl: Duration,
}

impl ScreenerCache {
    pub async fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, CacheError> {
        Ok(Self::from_cache(TtlCache::open(path, CacheTable::SCREENERS).await?, ttl))
    }

    pub fn from_cache(cache: TtlCache<Vec<ScreenerRow>>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Replace the membership list of a screener. Rows without a ticker are dropped.
    pub async fn store(&self, screener_name: &str, rows: Vec<ScreenerRow>) -> Result<usize, CacheError> {
        let rows: Vec<ScreenerRow> = rows
            .into_iter()
            .filter_map(|mut row| {
                row.ticker = row.ticker.trim().to_string();
                (!row.ticker.is_empty()).then_some(row)
            })
            .collect();

        if rows.is_empty() {
            return Ok(0);
        }

        self.cache.put(screener_name, &rows).await?;
        info!("📋 Stored {} tickers for screener '{}'", rows.len(), screener_name);
        Ok(rows.len())
    }

    pub async fn is_fresh(&self, screener_name: &str) -> bool {
        self.cache.get(screener_name, self.ttl).await.is_some()
    }

    /// Tickers of a screener if its list is within the freshness window
    pub async fn tickers(&self, screener_name: &str) -> Option<Vec<String>> {
        self.cache
            .get(screener_name, self.ttl)
            .await
            .map(|rows| rows.into_iter().map(|r| r.ticker).collect())
    }

    /// Tickers of lists stored on `date`, regardless of freshness.
    ///
    /// `all` yields the distinct tickers of every screener stored that day, sorted.
    pub async fn tickers_for_date(&self, screener_name: &str, date: NaiveDate) -> Vec<String> {
        self.rows_for_date(screener_name, date)
            .await
            .into_iter()
            .map(|row| row.ticker)
            .collect()
    }

    /// Rows of lists stored on the local calendar `date`, with their metadata.
    ///
    /// For `all`, the first row seen per ticker wins and rows are sorted by ticker.
    pub async fn rows_for_date(&self, screener_name: &str, date: NaiveDate) -> Vec<ScreenerRow> {
        let records = self.cache.records_stored_on(date).await;

        if screener_name.trim().eq_ignore_ascii_case(ALL_SCREENERS) {
            let mut distinct: BTreeMap<String, ScreenerRow> = BTreeMap::new();
            for row in records.into_iter().flat_map(|record| record.payload) {
                distinct.entry(row.ticker.clone()).or_insert(row);
            }
            return distinct.into_values().collect();
        }

        records
            .into_iter()
            .find(|record| record.key == screener_name)
            .map(|record| record.payload)
            .unwrap_or_default()
    }

    /// Rows stored on `date`, or on the day before when that date has none yet
    pub async fn latest_rows(&self, screener_name: &str, date: NaiveDate) -> Option<(NaiveDate, Vec<ScreenerRow>)> {
        for day in [date, date - Duration::days(1)] {
            let rows = self.rows_for_date(screener_name, day).await;
            if !rows.is_empty() {
                return Some((day, rows));
            }
            debug!("📋 No '{}' list stored on {}", screener_name, day);
        }
        None
    }
}

/// Column layout of a screener export
#[derive(Debug, Deserialize)]
struct ExportRow {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Company", default)]
    company: Option<String>,
    #[serde(rename = "Sector", default)]
    sector: Option<String>,
    #[serde(rename = "Industry", default)]
    industry: Option<String>,
    #[serde(rename = "Country", default)]
    country: Option<String>,
    #[serde(rename = "P/E", alias = "PE", default)]
    pe: Option<String>,
    #[serde(rename = "Market Cap", alias = "MarketCap", default)]
    market_cap: Option<String>,
}

/// Read a screener export with a `Ticker` column. Unparseable rows are skipped.
pub fn read_screener_csv<R: Read>(reader: R) -> Result<Vec<ScreenerRow>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = csv_reader.headers().context("Failed to read CSV header")?;
    if !headers.iter().any(|h| h == "Ticker") {
        anyhow::bail!("CSV has no Ticker column");
    }

    let mut rows = Vec::new();
    for (line, record) in csv_reader.deserialize::<ExportRow>().enumerate() {
        match record {
            Ok(row) => rows.push(ScreenerRow {
                ticker: row.ticker,
                company: row.company.filter(|v| !v.is_empty()),
                sector: row.sector.filter(|v| !v.is_empty()),
                industry: row.industry.filter(|v| !v.is_empty()),
                country: row.country.filter(|v| !v.is_empty()),
                pe: row.pe.filter(|v| !v.is_empty()),
                market_cap: row.market_cap.filter(|v| !v.is_empty()),
            }),
            Err(e) => warn!("⚠️ Skipping screener row {}: {}", line + 2, e),
        }
    }
    Ok(rows)
}
