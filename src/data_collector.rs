//! Cache-through access to every external data source.
//!
//! Every read goes to the TTL cache first; a miss (or a forced refresh) goes to
//! the provider and stores the fresh payload. When the provider fails, the last
//! stored copy is served regardless of age, if there is one.

use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::api::{FilingsProvider, PriceProvider};
use crate::cache::{CacheTable, TtlCache};
use crate::models::{Config, FilingsDocument, PriceBar, TickerMap};

const TICKER_MAP_KEY: &str = "sec_company_tickers";

/// Freshness windows per data kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub filings: Duration,
    pub prices: Duration,
    pub ticker_map: Duration,
}

impl Freshness {
    pub fn from_config(config: &Config) -> Self {
        Self {
            filings: Duration::days(config.filings_ttl_days),
            prices: Duration::days(config.price_ttl_days),
            ticker_map: Duration::days(config.ticker_map_ttl_days),
        }
    }
}

impl Default for Freshness {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The caches backing a collector
#[derive(Clone)]
pub struct CollectorCaches {
    pub filings: TtlCache<FilingsDocument>,
    pub prices: TtlCache<Vec<PriceBar>>,
    pub ticker_map: TtlCache<TickerMap>,
}

impl CollectorCaches {
    /// Open one cache file per data kind under the configured data directory
    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self {
            filings: TtlCache::open(config.filings_db_path(), CacheTable::FILINGS).await?,
            prices: TtlCache::open(config.price_db_path(), CacheTable::PRICES).await?,
            ticker_map: TtlCache::open(config.ticker_map_db_path(), CacheTable::TICKER_MAP).await?,
        })
    }
}

pub struct DataCollector {
    filings_provider: Arc<dyn FilingsProvider>,
    price_provider: Arc<dyn PriceProvider>,
    caches: CollectorCaches,
    freshness: Freshness,
    lookback_days: u32,
    ticker_map: OnceCell<TickerMap>,
}

impl DataCollector {
    pub fn new(
        filings_provider: Arc<dyn FilingsProvider>,
        price_provider: Arc<dyn PriceProvider>,
        caches: CollectorCaches,
        freshness: Freshness,
        lookback_days: u32,
    ) -> Self {
        Self {
            filings_provider,
            price_provider,
            caches,
            freshness,
            lookback_days,
            ticker_map: OnceCell::new(),
        }
    }

    /// Map a ticker symbol to its CIK. Case-insensitive; `BRK.B` and `BRK-B` are the same symbol.
    pub async fn resolve_ticker(&self, ticker: &str) -> Option<String> {
        let symbol = normalize_ticker(ticker);
        if symbol.is_empty() {
            return None;
        }
        let map = self.ticker_map.get_or_init(|| self.load_ticker_map()).await;
        map.get(&symbol).cloned()
    }

    async fn load_ticker_map(&self) -> TickerMap {
        let cache = &self.caches.ticker_map;
        if let Some(map) = cache.get(TICKER_MAP_KEY, self.freshness.ticker_map).await {
            debug!("📋 Using cached ticker map ({} symbols)", map.len());
            return map;
        }

        match self.filings_provider.ticker_map().await {
            Ok(map) => {
                if let Err(e) = cache.put(TICKER_MAP_KEY, &map).await {
                    warn!("⚠️ Could not cache ticker map: {}", e);
                }
                map
            }
            Err(e) => {
                warn!("❌ Failed to fetch ticker map: {}", e);
                match cache.get_stale(TICKER_MAP_KEY).await {
                    Some(record) => {
                        warn!("⚠️ Falling back to ticker map stored {}", record.stored_at);
                        record.payload
                    }
                    None => TickerMap::new(),
                }
            }
        }
    }

    /// Company facts document for a CIK, or `None` when it cannot be obtained
    pub async fn company_facts(&self, cik: &str, force_refresh: bool) -> Option<FilingsDocument> {
        let cache = &self.caches.filings;
        if !force_refresh {
            if let Some(doc) = cache.get(cik, self.freshness.filings).await {
                debug!("💾 Cache hit for CIK {}", cik);
                return Some(doc);
            }
        }

        match self.filings_provider.company_facts(cik).await {
            Ok(Some(doc)) => {
                if let Err(e) = cache.put(cik, &doc).await {
                    warn!("⚠️ Could not cache company facts for CIK {}: {}", cik, e);
                }
                info!("✅ Fetched company facts for CIK {}", cik);
                Some(doc)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("❌ Company facts fetch failed for CIK {}: {}", cik, e);
                stale_fallback(cache, cik).await
            }
        }
    }

    /// Daily price history for a ticker, or `None` when there is no data
    pub async fn daily_prices(&self, ticker: &str, force_refresh: bool) -> Option<Vec<PriceBar>> {
        let cache = &self.caches.prices;
        if !force_refresh {
            if let Some(bars) = cache.get(ticker, self.freshness.prices).await {
                return Some(bars);
            }
        }

        match self.price_provider.daily_prices(ticker, self.lookback_days).await {
            Ok(bars) if bars.is_empty() => {
                debug!("📭 No price data for {}", ticker);
                None
            }
            Ok(bars) => {
                if let Err(e) = cache.put(ticker, &bars).await {
                    warn!("⚠️ Could not cache prices for {}: {}", ticker, e);
                }
                Some(bars)
            }
            Err(e) => {
                warn!("❌ Failed to fetch prices for {}: {}", ticker, e);
                stale_fallback(cache, ticker).await
            }
        }
    }
}

async fn stale_fallback<T>(cache: &TtlCache<T>, key: &str) -> Option<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let record = cache.get_stale(key).await?;
    warn!("⚠️ Serving stale {} entry for {} (stored {})", cache.layout().table, key, record.stored_at);
    Some(record.payload)
}

/// Upper-case and map the class separator `.` to `-`
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase().replace('.', "-")
}
