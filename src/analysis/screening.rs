// Quality screen: oversold on price, sound on fundamentals

use tracing::{debug, info};

use super::{AnalysisReport, FundamentalAnalyzer};
use crate::technical::{OversoldSignal, DEFAULT_OVERSOLD_THRESHOLD};

const TECHNICAL_WEIGHT: f64 = 0.3;
const FUNDAMENTAL_WEIGHT: f64 = 0.7;
const TEST_COUNT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct QualityScreenConfig {
    pub threshold: f64,
    /// Most oversold candidates that get a fundamental analysis
    pub candidate_limit: usize,
    pub min_score: usize,
    pub top_n: usize,
    pub force_refresh: bool,
}

impl Default for QualityScreenConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_OVERSOLD_THRESHOLD,
            candidate_limit: 50,
            min_score: 5,
            top_n: 10,
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub signal: OversoldSignal,
    pub report: AnalysisReport,
    pub combined_score: f64,
}

/// Weighted blend of oversold depth and fundamental pass count, in `[0, 1]`
/// for %R readings in `[-100, 0]`.
pub fn combined_score(williams_r: f64, pass_count: usize) -> f64 {
    let technical = (williams_r + 100.0) / 100.0;
    let fundamental = pass_count as f64 / TEST_COUNT;
    TECHNICAL_WEIGHT * technical + FUNDAMENTAL_WEIGHT * fundamental
}

/// Score the most oversold signals and keep those passing at least `min_score`
/// tests, best combined score first.
pub async fn quality_screen(
    analyzer: &FundamentalAnalyzer,
    signals: &[OversoldSignal],
    config: &QualityScreenConfig,
) -> Vec<Opportunity> {
    let mut candidates: Vec<&OversoldSignal> = signals.iter().filter(|s| s.williams_r < config.threshold).collect();
    candidates.sort_by(|a, b| a.williams_r.total_cmp(&b.williams_r));
    candidates.truncate(config.candidate_limit);
    info!("🔍 Scoring {} oversold candidates", candidates.len());

    let mut opportunities = Vec::new();
    for signal in candidates {
        let Some(report) = analyzer.analyze(&signal.ticker, config.force_refresh).await.into_report() else {
            continue;
        };

        let passed = report.pass_count();
        if passed < config.min_score {
            debug!("{} passes {} tests, below {}", signal.ticker, passed, config.min_score);
            continue;
        }

        opportunities.push(Opportunity {
            combined_score: combined_score(signal.williams_r, passed),
            signal: signal.clone(),
            report,
        });
    }

    opportunities.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.signal.ticker.cmp(&b.signal.ticker))
    });
    opportunities.truncate(config.top_n);
    info!("🎯 {} opportunities after the quality screen", opportunities.len());
    opportunities
}
