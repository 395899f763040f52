use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{BackoffSchedule, FilingsProvider, ProviderError};
use crate::models::{Config, FilingsDocument, TickerMap};

const TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const FACTS_BASE_URL: &str = "https://data.sec.gov/";

/// Entry of company_tickers.json
#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
}

/// SEC EDGAR client for the ticker directory and XBRL company facts
pub struct SecClient {
    http_client: Client,
    tickers_url: Url,
    facts_base_url: Url,
    rate_limiter: DefaultDirectRateLimiter,
    backoff: BackoffSchedule,
}

impl SecClient {
    /// Create a client for the public SEC endpoints
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        Self::with_endpoints(
            &config.sec_user_agent,
            TICKERS_URL,
            FACTS_BASE_URL,
            config.sec_requests_per_second,
            BackoffSchedule::default(),
        )
    }

    /// Create a client against custom endpoints (mirrors, test servers)
    pub fn with_endpoints(
        user_agent: &str,
        tickers_url: &str,
        facts_base_url: &str,
        requests_per_second: u32,
        backoff: BackoffSchedule,
    ) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| ProviderError::Transport { url: facts_base_url.to_string(), source })?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            tickers_url: Url::parse(tickers_url)?,
            facts_base_url: Url::parse(facts_base_url)?,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
            backoff,
        })
    }

    fn company_facts_url(&self, cik: &str) -> Result<Url, ProviderError> {
        Ok(self
            .facts_base_url
            .join(&format!("api/xbrl/companyfacts/CIK{}.json", zero_pad_cik(cik)))?)
    }

    /// One rate-limited GET. `Ok(None)` on 404.
    async fn get_once(&self, url: &Url) -> Result<Option<String>, ProviderError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ProviderError::Transport { url: url.to_string(), source })?;

        match response.status() {
            StatusCode::OK => response
                .text()
                .await
                .map(Some)
                .map_err(|source| ProviderError::Transport { url: url.to_string(), source }),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ProviderError::Status { url: url.to_string(), status: status.as_u16() }),
        }
    }

    /// GET with the backoff schedule applied to transient failures
    async fn get_with_retry(&self, url: &Url) -> Result<Option<String>, ProviderError> {
        let mut delays = self.backoff.delays.iter();
        loop {
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() => match delays.next() {
                    Some(delay) => {
                        warn!("⚠️ {} - retrying in {:?}", e, delay);
                        tokio::time::sleep(*delay).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl FilingsProvider for SecClient {
    async fn ticker_map(&self) -> Result<TickerMap, ProviderError> {
        let url = self.tickers_url.clone();
        let body = self
            .get_with_retry(&url)
            .await?
            .ok_or(ProviderError::Status { url: url.to_string(), status: 404 })?;

        let entries: HashMap<String, TickerEntry> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Decode { url: url.to_string(), message: e.to_string() })?;

        let map: TickerMap = entries
            .into_values()
            .map(|entry| (entry.ticker.to_uppercase(), format!("{:010}", entry.cik_str)))
            .collect();

        info!("📋 Loaded {} ticker → CIK mappings from SEC", map.len());
        Ok(map)
    }

    async fn company_facts(&self, cik: &str) -> Result<Option<FilingsDocument>, ProviderError> {
        let url = self.company_facts_url(cik)?;
        debug!("🔍 Fetching company facts from {}", url);

        let Some(body) = self.get_with_retry(&url).await? else {
            info!("📭 SEC has no company facts for CIK {}", cik);
            return Ok(None);
        };

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ProviderError::Decode { url: url.to_string(), message: e.to_string() })
    }
}

/// CIKs are addressed as 10 digits on the SEC endpoints
pub fn zero_pad_cik(cik: &str) -> String {
    let digits = cik.trim();
    format!("{:0>10}", digits)
}
