use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::{FilingsDocument, PriceBar, TickerMap};

pub mod sec_client;
pub mod yahoo_client;

pub use sec_client::SecClient;
pub use yahoo_client::YahooChartClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl ProviderError {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport { .. } => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Decode { .. } | ProviderError::Endpoint(_) => false,
        }
    }
}

/// Source of regulatory filings and the ticker → CIK directory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FilingsProvider: Send + Sync {
    async fn ticker_map(&self) -> Result<TickerMap, ProviderError>;

    /// `Ok(None)` means the provider has no document for this CIK
    async fn company_facts(&self, cik: &str) -> Result<Option<FilingsDocument>, ProviderError>;
}

/// Source of daily price history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn daily_prices(&self, ticker: &str, lookback_days: u32) -> Result<Vec<PriceBar>, ProviderError>;
}

/// Delays between network attempts. An empty schedule means a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    pub delays: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            delays: vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)],
        }
    }
}
