//! Screener list report.
//!
//! Takes the members of a stored screener list, drops industries whose filings
//! do not fit the scorecard (funds, asset managers, REITs), keeps the cheapest
//! names by positive P/E and attaches the fundamental score and the latest
//! oversold reading to each.

use std::sync::Arc;

use tracing::{debug, info};

use super::{AnalysisOutcome, FundamentalAnalyzer};
use crate::concurrent_fetcher::{fetch_prices_concurrently, ConcurrentFetchConfig};
use crate::data_collector::normalize_ticker;
use crate::models::ScreenerRow;
use crate::technical::{rsi, williams_r, Intensity, RSI_PERIOD, WILLIAMS_R_PERIOD};

/// Industries left out of the report, matched case-insensitively as substrings
pub const EXCLUDED_INDUSTRIES: [&str; 4] = ["Asset Management", "REIT", "Financial Fund", "Closed-End Fund"];

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenerReportConfig {
    pub excluded_industries: Vec<String>,
    pub top_n: usize,
    pub force_refresh: bool,
}

impl Default for ScreenerReportConfig {
    fn default() -> Self {
        Self {
            excluded_industries: EXCLUDED_INDUSTRIES.iter().map(|s| s.to_string()).collect(),
            top_n: 20,
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenerReportRow {
    pub listing: ScreenerRow,
    pub pe: f64,
    pub outcome: AnalysisOutcome,
    pub williams_r: Option<f64>,
    pub rsi: Option<f64>,
    pub intensity: Intensity,
}

impl ScreenerReportRow {
    /// `passed/valid`, or `N/A` when the ticker could not be scored
    pub fn buffett_score(&self) -> String {
        self.outcome
            .report()
            .map(|report| report.score_label())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// P/E as exported. Thousands separators are accepted; `-`, `N/A` and blanks are `None`.
pub fn parse_pe(raw: Option<&str>) -> Option<f64> {
    raw?.trim().replace(',', "").parse::<f64>().ok().filter(|pe| pe.is_finite())
}

fn is_excluded(industry: Option<&str>, excluded: &[String]) -> bool {
    let Some(industry) = industry else {
        return false;
    };
    let industry = industry.to_lowercase();
    excluded.iter().any(|name| industry.contains(&name.to_lowercase()))
}

/// Eligible listings with a positive P/E, cheapest first, at most `top_n`
pub fn select_listings(rows: &[ScreenerRow], config: &ScreenerReportConfig) -> Vec<(ScreenerRow, f64)> {
    let mut listings: Vec<(ScreenerRow, f64)> = rows
        .iter()
        .filter(|row| {
            let excluded = is_excluded(row.industry.as_deref(), &config.excluded_industries);
            if excluded {
                debug!("Skipping {} ({})", row.ticker, row.industry.as_deref().unwrap_or_default());
            }
            !excluded
        })
        .filter_map(|row| {
            let pe = parse_pe(row.pe.as_deref()).filter(|pe| *pe > 0.0)?;
            Some((row.clone(), pe))
        })
        .collect();

    listings.sort_by(|a, b| a.1.total_cmp(&b.1));
    listings.truncate(config.top_n);
    listings
}

/// Score and chart the selected listings of a screener list
pub async fn screener_report(
    analyzer: &FundamentalAnalyzer,
    rows: &[ScreenerRow],
    fetch_config: &ConcurrentFetchConfig,
    config: &ScreenerReportConfig,
) -> Vec<ScreenerReportRow> {
    let listings = select_listings(rows, config);
    info!("📋 Reporting on {} of {} listed stocks", listings.len(), rows.len());

    let tickers: Vec<String> = listings.iter().map(|(row, _)| normalize_ticker(&row.ticker)).collect();
    let fetched = fetch_prices_concurrently(Arc::clone(analyzer.collector()), &tickers, fetch_config).await;

    let mut report = Vec::with_capacity(listings.len());
    for ((listing, pe), ticker) in listings.into_iter().zip(tickers) {
        let outcome = analyzer.analyze(&ticker, config.force_refresh).await;

        let bars = fetched.prices.get(&ticker);
        let latest_wr = bars.and_then(|bars| williams_r(bars, WILLIAMS_R_PERIOD).last().copied().flatten());
        let latest_rsi = bars.and_then(|bars| rsi(bars, RSI_PERIOD));

        report.push(ScreenerReportRow {
            listing,
            pe,
            outcome,
            williams_r: latest_wr,
            rsi: latest_rsi,
            intensity: Intensity::classify(latest_wr),
        });
    }
    report
}
