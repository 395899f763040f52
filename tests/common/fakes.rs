//! In-memory providers for pipeline tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use stock_scorecard::api::{FilingsProvider, PriceProvider, ProviderError};
use stock_scorecard::models::{FilingsDocument, PriceBar, TickerMap};

#[derive(Default)]
pub struct FakeFilings {
    pub tickers: TickerMap,
    pub documents: HashMap<String, FilingsDocument>,
    /// CIKs whose fetch fails with a server error
    pub failing: HashSet<String>,
    pub facts_calls: AtomicUsize,
}

impl FakeFilings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, ticker: &str, cik: &str, document: FilingsDocument) -> Self {
        self.tickers.insert(ticker.to_string(), cik.to_string());
        self.documents.insert(cik.to_string(), document);
        self
    }

    /// Known ticker with no filings document
    pub fn with_ticker(mut self, ticker: &str, cik: &str) -> Self {
        self.tickers.insert(ticker.to_string(), cik.to_string());
        self
    }

    pub fn failing_for(mut self, cik: &str) -> Self {
        self.failing.insert(cik.to_string());
        self
    }

    pub fn facts_calls(&self) -> usize {
        self.facts_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FilingsProvider for FakeFilings {
    async fn ticker_map(&self) -> Result<TickerMap, ProviderError> {
        Ok(self.tickers.clone())
    }

    async fn company_facts(&self, cik: &str) -> Result<Option<FilingsDocument>, ProviderError> {
        self.facts_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(cik) {
            return Err(ProviderError::Status { url: format!("fake://{}", cik), status: 503 });
        }
        Ok(self.documents.get(cik).cloned())
    }
}

#[derive(Default)]
pub struct FakePrices {
    pub series: HashMap<String, Vec<PriceBar>>,
    pub failing: HashSet<String>,
    pub calls: AtomicUsize,
}

impl FakePrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.series.insert(ticker.to_string(), bars);
        self
    }

    pub fn failing_for(mut self, ticker: &str) -> Self {
        self.failing.insert(ticker.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceProvider for FakePrices {
    async fn daily_prices(&self, ticker: &str, _lookback_days: u32) -> Result<Vec<PriceBar>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(ticker) {
            return Err(ProviderError::Status { url: format!("fake://{}", ticker), status: 500 });
        }
        Ok(self.series.get(ticker).cloned().unwrap_or_default())
    }
}
