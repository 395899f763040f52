use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

/// Raw company facts document as served by the SEC XBRL API.
///
/// Layout is namespace → tag → unit → entries. Maps are ordered so that
/// iteration over units is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilingsDocument {
    #[serde(default)]
    pub cik: Option<u64>,
    #[serde(rename = "entityName", default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub facts: BTreeMap<String, BTreeMap<String, TagFacts>>,
}

impl FilingsDocument {
    /// Look up a tag inside a namespace
    pub fn tag(&self, namespace: &str, tag: &str) -> Option<&TagFacts> {
        self.facts.get(namespace).and_then(|tags| tags.get(tag))
    }
}

/// All reported values for one tag, grouped by unit of measure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagFacts {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub units: BTreeMap<String, Vec<FactEntry>>,
}

/// A single reported value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactEntry {
    #[serde(rename = "val")]
    pub value: f64,
    #[serde(rename = "end")]
    pub period_end: NaiveDate,
    #[serde(rename = "fy", default)]
    pub fiscal_year: Option<i32>,
    #[serde(rename = "fp", default, skip_serializing_if = "Option::is_none")]
    pub fiscal_period: Option<String>,
    #[serde(rename = "form")]
    pub filing_form: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filed: Option<NaiveDate>,
    #[serde(rename = "accn", default, skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
}

/// Where an extracted value came from. Display only, never used for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub tag: String,
    pub label: Option<String>,
    pub period_end: NaiveDate,
    pub fiscal_year: Option<i32>,
    pub unit: String,
    pub form: String,
}

/// Logical financial facts the scoring engine consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKey {
    Cash,
    Investments,
    Debt,
    Liabilities,
    Equity,
    OperatingCashFlow,
    Capex,
    NetIncome,
    CurrentAssets,
    CurrentLiabilities,
    OperatingIncome,
    Revenue,
    Assets,
    InterestExpense,
}

impl FactKey {
    pub const ALL: [FactKey; 14] = [
        FactKey::Cash,
        FactKey::Investments,
        FactKey::Debt,
        FactKey::Liabilities,
        FactKey::Equity,
        FactKey::OperatingCashFlow,
        FactKey::Capex,
        FactKey::NetIncome,
        FactKey::CurrentAssets,
        FactKey::CurrentLiabilities,
        FactKey::OperatingIncome,
        FactKey::Revenue,
        FactKey::Assets,
        FactKey::InterestExpense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactKey::Cash => "cash",
            FactKey::Investments => "investments",
            FactKey::Debt => "debt",
            FactKey::Liabilities => "liabilities",
            FactKey::Equity => "equity",
            FactKey::OperatingCashFlow => "ocf",
            FactKey::Capex => "capex",
            FactKey::NetIncome => "income",
            FactKey::CurrentAssets => "current_assets",
            FactKey::CurrentLiabilities => "current_liabilities",
            FactKey::OperatingIncome => "oi",
            FactKey::Revenue => "revenue",
            FactKey::Assets => "assets",
            FactKey::InterestExpense => "interest",
        }
    }
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat mapping of logical facts to optional values. Built fresh per analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactMapping {
    values: HashMap<FactKey, f64>,
}

impl FactMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: FactKey) -> Option<f64> {
        self.values.get(&key).copied()
    }

    pub fn set(&mut self, key: FactKey, value: Option<f64>) {
        match value {
            Some(v) => {
                self.values.insert(key, v);
            }
            None => {
                self.values.remove(&key);
            }
        }
    }

    pub fn with(mut self, key: FactKey, value: f64) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(FactKey, f64)> for FactMapping {
    fn from_iter<I: IntoIterator<Item = (FactKey, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// One value per distinct fiscal year, most recent first
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalPoint {
    pub fiscal_year: Option<i32>,
    pub period_end: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalSeries {
    pub tag: String,
    pub points: Vec<HistoricalPoint>,
}

impl HistoricalSeries {
    /// Build a series from bare values, most recent first. Years are left unknown.
    pub fn from_values(tag: &str, values: &[f64]) -> Self {
        Self {
            tag: tag.to_string(),
            points: values
                .iter()
                .map(|&value| HistoricalPoint {
                    fiscal_year: None,
                    period_end: NaiveDate::MIN,
                    value,
                })
                .collect(),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Verdict of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreStatus {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "NA")]
    NotApplicable,
}

impl fmt::Display for ScoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScoreStatus::Pass => "PASS",
            ScoreStatus::Fail => "FAIL",
            ScoreStatus::NotApplicable => "NA",
        })
    }
}

/// Computed value of a test. Numeric variants hold the unrounded value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreValue {
    Missing,
    Ratio(f64),
    Percent(f64),
    Count { positive: usize, window: usize },
    Label(&'static str),
}

impl ScoreValue {
    /// Unrounded numeric value, if the test produced one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScoreValue::Ratio(v) | ScoreValue::Percent(v) => Some(*v),
            ScoreValue::Count { positive, .. } => Some(*positive as f64),
            ScoreValue::Missing | ScoreValue::Label(_) => None,
        }
    }
}

impl fmt::Display for ScoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreValue::Missing => f.write_str("-"),
            ScoreValue::Ratio(v) if v.is_infinite() => f.write_str("inf"),
            ScoreValue::Ratio(v) => write!(f, "{:.2}", v),
            ScoreValue::Percent(v) if v.is_infinite() => f.write_str("inf%"),
            ScoreValue::Percent(v) => write!(f, "{:.1}%", v * 100.0),
            ScoreValue::Count { positive, window } => write!(f, "{}/{}", positive, window),
            ScoreValue::Label(label) => f.write_str(label),
        }
    }
}

/// Result of one scoring test
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub name: &'static str,
    pub status: ScoreStatus,
    pub value: ScoreValue,
    pub target: &'static str,
    pub description: &'static str,
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<u64>,
}

/// One row of a screener membership list.
///
/// Descriptive columns are optional so that lists stored before a column
/// existed keep deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenerRow {
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub pe: Option<String>,
    #[serde(default)]
    pub market_cap: Option<String>,
}

/// Ticker symbol → zero-padded CIK
pub type TickerMap = HashMap<String, String>;

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub sec_user_agent: String,
    pub sec_requests_per_second: u32,
    pub filings_ttl_days: i64,
    pub price_ttl_days: i64,
    pub screener_ttl_days: i64,
    pub ticker_map_ttl_days: i64,
    pub price_lookback_days: u32,
    pub price_workers: usize,
    pub batch_pause_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sec_user_agent: "stock-scorecard/0.1 (contact@example.com)".to_string(),
            sec_requests_per_second: 10,
            filings_ttl_days: 7,
            price_ttl_days: 1,
            screener_ttl_days: 1,
            ticker_map_ttl_days: 30,
            price_lookback_days: 90,
            price_workers: 10,
            batch_pause_ms: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();
        Ok(Config {
            data_dir: std::env::var("SCORECARD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            sec_user_agent: std::env::var("SEC_USER_AGENT").unwrap_or(defaults.sec_user_agent),
            sec_requests_per_second: env_or("SEC_REQUESTS_PER_SECOND", defaults.sec_requests_per_second)?,
            filings_ttl_days: env_or("FILINGS_TTL_DAYS", defaults.filings_ttl_days)?,
            price_ttl_days: env_or("PRICE_TTL_DAYS", defaults.price_ttl_days)?,
            screener_ttl_days: env_or("SCREENER_TTL_DAYS", defaults.screener_ttl_days)?,
            ticker_map_ttl_days: env_or("TICKER_MAP_TTL_DAYS", defaults.ticker_map_ttl_days)?,
            price_lookback_days: env_or("PRICE_LOOKBACK_DAYS", defaults.price_lookback_days)?,
            price_workers: env_or("PRICE_WORKERS", defaults.price_workers)?,
            batch_pause_ms: env_or("BATCH_PAUSE_MS", defaults.batch_pause_ms)?,
        })
    }

    pub fn filings_db_path(&self) -> PathBuf {
        self.data_dir.join("sec_cache.db")
    }

    pub fn price_db_path(&self) -> PathBuf {
        self.data_dir.join("price_cache.db")
    }

    pub fn screener_db_path(&self) -> PathBuf {
        self.data_dir.join("screener_cache.db")
    }

    pub fn ticker_map_db_path(&self) -> PathBuf {
        self.data_dir.join("ticker_map.db")
    }
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}
