//! Fundamental analysis pipeline: ticker → CIK → filings → facts → scores.

pub mod screener_report;
pub mod screening;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::data_collector::{normalize_ticker, DataCollector};
use crate::facts::{FactResolver, DEFAULT_HISTORY_LIMIT, NET_INCOME_TAG};
use crate::models::{FactKey, FactMapping, Provenance, ScoreResult, ScoreStatus};
use crate::scoring::ScoringEngine;

pub use screener_report::{screener_report, select_listings, ScreenerReportConfig, ScreenerReportRow, EXCLUDED_INDUSTRIES};
pub use screening::{combined_score, quality_screen, Opportunity, QualityScreenConfig};

/// Scored analysis of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub ticker: String,
    pub cik: String,
    pub entity_name: Option<String>,
    pub facts: FactMapping,
    pub provenance: BTreeMap<FactKey, Provenance>,
    pub results: Vec<ScoreResult>,
}

impl AnalysisReport {
    pub fn pass_count(&self) -> usize {
        self.count(ScoreStatus::Pass)
    }

    pub fn fail_count(&self) -> usize {
        self.count(ScoreStatus::Fail)
    }

    pub fn na_count(&self) -> usize {
        self.count(ScoreStatus::NotApplicable)
    }

    /// Tests that could be decided
    pub fn valid_count(&self) -> usize {
        self.results.len() - self.na_count()
    }

    /// `passed/valid`
    pub fn score_label(&self) -> String {
        format!("{}/{}", self.pass_count(), self.valid_count())
    }

    /// Most recent period end among the facts that fed the scores
    pub fn latest_period_end(&self) -> Option<NaiveDate> {
        self.provenance.values().map(|p| p.period_end).max()
    }

    pub fn results_with(&self, status: ScoreStatus) -> impl Iterator<Item = &ScoreResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    fn count(&self, status: ScoreStatus) -> usize {
        self.results_with(status).count()
    }
}

/// Result of analyzing one ticker
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Scored(AnalysisReport),
    /// Symbol absent from the ticker → CIK directory
    UnknownTicker { ticker: String },
    /// No filings document could be obtained for the CIK
    NoFilings { ticker: String, cik: String },
    Failed { ticker: String, reason: String },
}

impl AnalysisOutcome {
    pub fn ticker(&self) -> &str {
        match self {
            AnalysisOutcome::Scored(report) => &report.ticker,
            AnalysisOutcome::UnknownTicker { ticker }
            | AnalysisOutcome::NoFilings { ticker, .. }
            | AnalysisOutcome::Failed { ticker, .. } => ticker,
        }
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisOutcome::Scored(report) => Some(report),
            _ => None,
        }
    }

    pub fn into_report(self) -> Option<AnalysisReport> {
        match self {
            AnalysisOutcome::Scored(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct FundamentalAnalyzer {
    collector: Arc<DataCollector>,
    resolver: FactResolver,
}

impl FundamentalAnalyzer {
    pub fn new(collector: Arc<DataCollector>, resolver: FactResolver) -> Self {
        Self { collector, resolver }
    }

    pub fn collector(&self) -> &Arc<DataCollector> {
        &self.collector
    }

    pub async fn analyze(&self, ticker: &str, force_refresh: bool) -> AnalysisOutcome {
        let ticker = normalize_ticker(ticker);

        let Some(cik) = self.collector.resolve_ticker(&ticker).await else {
            warn!("❌ Could not resolve ticker {} to a CIK", ticker);
            return AnalysisOutcome::UnknownTicker { ticker };
        };

        let Some(document) = self.collector.company_facts(&cik, force_refresh).await else {
            warn!("❌ No SEC filings for {} (CIK {})", ticker, cik);
            return AnalysisOutcome::NoFilings { ticker, cik };
        };

        let extracted = self.resolver.extract_facts(&document);
        let series = self
            .resolver
            .extract_historical_facts(&document, NET_INCOME_TAG, DEFAULT_HISTORY_LIMIT);
        let history = HashMap::from([(NET_INCOME_TAG.to_string(), series)]);
        let results = ScoringEngine::new(&extracted.facts, &history).evaluate_all();

        let report = AnalysisReport {
            ticker,
            cik,
            entity_name: document.entity_name,
            facts: extracted.facts,
            provenance: extracted.provenance,
            results,
        };
        info!("📊 {} scored {}", report.ticker, report.score_label());
        AnalysisOutcome::Scored(report)
    }

    /// Analyze tickers one after another. Each analysis runs in its own task so
    /// that a panic in one entity is reported as `Failed` for that entity only.
    pub async fn analyze_batch(&self, tickers: &[String], force_refresh: bool) -> Vec<AnalysisOutcome> {
        let mut outcomes = Vec::with_capacity(tickers.len());

        for ticker in tickers.iter().filter(|t| !t.trim().is_empty()) {
            let analyzer = self.clone();
            let symbol = ticker.clone();
            let handle = tokio::spawn(async move { analyzer.analyze(&symbol, force_refresh).await });

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("❌ Analysis of {} failed: {}", ticker, e);
                    AnalysisOutcome::Failed { ticker: normalize_ticker(ticker), reason: e.to_string() }
                }
            };
            outcomes.push(outcome);
        }

        let scored = outcomes.iter().filter(|o| o.report().is_some()).count();
        info!("✅ Batch analysis completed: {}/{} scored", scored, outcomes.len());
        outcomes
    }
}
