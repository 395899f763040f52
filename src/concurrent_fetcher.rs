//! Batched concurrent price fetching
//!
//! Tickers are processed in fixed-size batches, one task per ticker. Each batch
//! is a barrier: its results are collected before the next batch starts, and a
//! short pause separates batches to stay under third-party rate limits.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::data_collector::DataCollector;
use crate::models::{Config, PriceBar};

/// Configuration for concurrent fetching
#[derive(Debug, Clone)]
pub struct ConcurrentFetchConfig {
    /// Tasks per batch
    pub num_workers: usize,
    pub batch_pause: Duration,
    pub force_refresh: bool,
}

impl ConcurrentFetchConfig {
    pub fn from_config(config: &Config, force_refresh: bool) -> Self {
        Self {
            num_workers: config.price_workers,
            batch_pause: Duration::from_millis(config.batch_pause_ms),
            force_refresh,
        }
    }
}

/// Result of a batched fetch
#[derive(Debug, Default)]
pub struct FetchResult {
    pub prices: HashMap<String, Vec<PriceBar>>,
    pub total_tickers: usize,
    pub fetched_tickers: usize,
    pub empty_tickers: usize,
    pub failed_tickers: usize,
}

/// Fetch price history for every ticker. Individual failures become "no data".
pub async fn fetch_prices_concurrently(
    collector: Arc<DataCollector>,
    tickers: &[String],
    config: &ConcurrentFetchConfig,
) -> FetchResult {
    let batch_size = config.num_workers.max(1);
    let mut result = FetchResult { total_tickers: tickers.len(), ..FetchResult::default() };
    info!("🚀 Fetching prices for {} tickers in batches of {}", tickers.len(), batch_size);

    let batches: Vec<&[String]> = tickers.chunks(batch_size).collect();
    let batch_count = batches.len();

    for (batch_index, batch) in batches.into_iter().enumerate() {
        let handles: Vec<_> = batch
            .iter()
            .map(|ticker| {
                let collector = Arc::clone(&collector);
                let ticker = ticker.clone();
                let force_refresh = config.force_refresh;
                tokio::spawn(async move {
                    let bars = collector.daily_prices(&ticker, force_refresh).await;
                    (ticker, bars)
                })
            })
            .collect();

        for (joined, ticker) in join_all(handles).await.into_iter().zip(batch) {
            match joined {
                Ok((ticker, Some(bars))) => {
                    result.fetched_tickers += 1;
                    result.prices.insert(ticker, bars);
                }
                Ok((ticker, None)) => {
                    debug!("📭 No prices for {}", ticker);
                    result.empty_tickers += 1;
                }
                Err(e) => {
                    error!("❌ Price task for {} failed: {}", ticker, e);
                    result.failed_tickers += 1;
                }
            }
        }

        debug!("📦 Batch {}/{} done", batch_index + 1, batch_count);
        if batch_index + 1 < batch_count && !config.batch_pause.is_zero() {
            tokio::time::sleep(config.batch_pause).await;
        }
    }

    info!(
        "✅ Price fetch completed: {} with data, {} empty, {} failed",
        result.fetched_tickers, result.empty_tickers, result.failed_tickers
    );
    result
}
