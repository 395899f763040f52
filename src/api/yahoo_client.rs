use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{PriceProvider, ProviderError};
use crate::models::PriceBar;

const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Daily bars from the public chart endpoint
pub struct YahooChartClient {
    http_client: Client,
    base_url: Url,
}

impl YahooChartClient {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(CHART_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; stock-scorecard/0.1)")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| ProviderError::Transport { url: base_url.to_string(), source })?;

        Ok(Self { http_client, base_url: Url::parse(base_url)? })
    }

    fn chart_url(&self, ticker: &str, lookback_days: u32) -> Result<Url, ProviderError> {
        // Class shares use a dash on this endpoint (BRK.B → BRK-B)
        let symbol = ticker.trim().to_uppercase().replace('.', "-");
        let mut url = self.base_url.join(&format!("v8/finance/chart/{}", symbol))?;
        url.query_pairs_mut()
            .append_pair("range", &format!("{}d", lookback_days))
            .append_pair("interval", "1d");
        Ok(url)
    }
}

#[async_trait]
impl PriceProvider for YahooChartClient {
    async fn daily_prices(&self, ticker: &str, lookback_days: u32) -> Result<Vec<PriceBar>, ProviderError> {
        let url = self.chart_url(ticker, lookback_days)?;
        debug!("📈 Fetching {} days of prices for {}", lookback_days, ticker);

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ProviderError::Transport { url: url.to_string(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode { url: url.to_string(), message: e.to_string() })?;

        Ok(chart
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .map(bars_from_chart)
            .unwrap_or_default())
    }
}

/// Zip the column arrays into bars, skipping days without a close
fn bars_from_chart(result: ChartResult) -> Vec<PriceBar> {
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let close = quote.close.get(i).copied().flatten()?;
            let date = DateTime::from_timestamp(ts, 0)?.date_naive();
            let pick = |column: &Vec<Option<f64>>| column.get(i).copied().flatten().unwrap_or(close);
            Some(PriceBar {
                date,
                open: pick(&quote.open),
                high: pick(&quote.high),
                low: pick(&quote.low),
                close,
                volume: quote.volume.get(i).copied().flatten(),
            })
        })
        .collect()
}
