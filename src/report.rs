//! Text rendering of analyses, scans and screens.
//!
//! `Telegram` output is emoji and markdown tables meant for a chat message;
//! `Plain` output is one comma-separated line per item.

use std::time::Duration;

use chrono::NaiveDate;

use tracing::warn;

use crate::analysis::{AnalysisOutcome, AnalysisReport, Opportunity, QualityScreenConfig, ScreenerReportRow};
use crate::models::{ScoreResult, ScoreStatus};
use crate::technical::{Intensity, OversoldSignal};

const DISCLAIMER: &str = "⚠️ Not financial advice.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Telegram,
    Plain,
}

pub fn render_outcome(outcome: &AnalysisOutcome, format: OutputFormat) -> String {
    match outcome {
        AnalysisOutcome::Scored(report) => render_analysis(report, format),
        AnalysisOutcome::UnknownTicker { ticker } => match format {
            OutputFormat::Telegram => format!("Error: Could not resolve ticker {} to a CIK.\n", ticker),
            OutputFormat::Plain => format!("{},ERROR,unknown ticker\n", ticker),
        },
        AnalysisOutcome::NoFilings { ticker, cik } => match format {
            OutputFormat::Telegram => format!("Error: Could not retrieve SEC data for {} (CIK: {}).\n", ticker, cik),
            OutputFormat::Plain => format!("{},ERROR,no filings\n", ticker),
        },
        AnalysisOutcome::Failed { ticker, reason } => match format {
            OutputFormat::Telegram => format!("Error: Analysis of {} failed: {}\n", ticker, reason),
            OutputFormat::Plain => format!("{},ERROR,{}\n", ticker, reason),
        },
    }
}

pub fn render_analysis(report: &AnalysisReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Telegram => telegram_analysis(report),
        OutputFormat::Plain => plain_analysis(report),
    }
}

fn telegram_analysis(report: &AnalysisReport) -> String {
    let mut lines = vec![
        format!("📊 {} — Buffett Analysis", report.ticker),
        format!("Score: {} Buffett Criteria", report.score_label()),
        String::new(),
    ];

    let strengths: Vec<&ScoreResult> = report.results_with(ScoreStatus::Pass).collect();
    if !strengths.is_empty() {
        lines.push("✅ Strengths".to_string());
        lines.extend(result_table(&strengths));
        lines.push(String::new());
    }

    let concerns: Vec<&ScoreResult> = report.results_with(ScoreStatus::Fail).collect();
    if !concerns.is_empty() {
        lines.push("❌ Concerns".to_string());
        lines.extend(result_table(&concerns));
        lines.push(String::new());
    }

    let missing: Vec<&str> = report.results_with(ScoreStatus::NotApplicable).map(|r| r.name).collect();
    if !missing.is_empty() {
        lines.push(format!("ℹ️ Missing Data: {}", missing.join(", ")));
        lines.push(String::new());
    }

    if let Some(period_end) = report.latest_period_end() {
        lines.push(format!("📎 Data: SEC EDGAR 10-K ({})", period_end));
    }
    lines.push(DISCLAIMER.to_string());
    finish(lines)
}

fn result_table(results: &[&ScoreResult]) -> Vec<String> {
    let mut rows = vec![
        format!("| {:<20} | {:<10} | {:<10} |", "Metric", "Value", "Target"),
        format!("| {} | {} | {} |", "-".repeat(20), "-".repeat(10), "-".repeat(10)),
    ];
    rows.extend(
        results
            .iter()
            .map(|r| format!("| {:<20} | {:<10} | {:<10} |", r.name, r.value.to_string(), r.target)),
    );
    rows
}

fn plain_analysis(report: &AnalysisReport) -> String {
    let mut lines = vec![format!("{},{},{}", report.ticker, report.cik, report.score_label())];
    lines.extend(
        report
            .results
            .iter()
            .map(|r| format!("{},{},{},{}", report.ticker, r.name, r.status, r.value)),
    );
    finish(lines)
}

/// Heading for a screener batch
pub fn render_batch_header(screener: &str, date: NaiveDate, count: usize, format: OutputFormat) -> String {
    match format {
        OutputFormat::Telegram => format!(
            "📋 Buffett Analysis — screener: {} (updated {}, {} stocks)\n\n",
            screener, date, count
        ),
        OutputFormat::Plain => String::new(),
    }
}

const SCAN_GROUPS: [Intensity; 4] = [Intensity::Extreme, Intensity::VeryStrong, Intensity::Strong, Intensity::Moderate];

/// Oversold scan. `signals` is expected most oversold first; `found` is the
/// number of signals before truncation.
pub fn render_scan(
    signals: &[OversoldSignal],
    scanned: usize,
    found: usize,
    elapsed: Duration,
    format: OutputFormat,
) -> String {
    if format == OutputFormat::Plain {
        return finish(
            signals
                .iter()
                .map(|s| format!("{},{:.2},{}", s.ticker, s.williams_r, s.intensity))
                .collect(),
        );
    }

    let share = if scanned == 0 { 0.0 } else { found as f64 / scanned as f64 * 100.0 };
    let mut lines = vec![
        "📊 Oversold Scan".to_string(),
        format!("Scanned: {} | Found: {} oversold ({:.1}%)", scanned, found, share),
        String::new(),
    ];

    for intensity in SCAN_GROUPS {
        let group: Vec<&OversoldSignal> = signals.iter().filter(|s| s.intensity == intensity).collect();
        if group.is_empty() {
            continue;
        }
        lines.push(format!(
            "{} {} ({}): {} stocks",
            intensity.emoji(),
            intensity,
            intensity.range_label(),
            group.len()
        ));
        for (i, s) in group.iter().enumerate() {
            let ema = s.ema.map(|e| format!(" | EMA: {:.1}", e)).unwrap_or_default();
            lines.push(format!("{}. {} — %R: {:.1}{}", i + 1, s.ticker, s.williams_r, ema));
        }
        lines.push(String::new());
    }

    lines.push(format!("⚡ {:.1}s | {}", elapsed.as_secs_f64(), DISCLAIMER));
    finish(lines)
}

pub fn render_screen(
    opportunities: &[Opportunity],
    config: &QualityScreenConfig,
    elapsed: Duration,
    format: OutputFormat,
) -> String {
    if format == OutputFormat::Plain {
        return finish(
            opportunities
                .iter()
                .map(|o| {
                    format!(
                        "{},{:.2},{},{:.3}",
                        o.signal.ticker,
                        o.signal.williams_r,
                        o.report.pass_count(),
                        o.combined_score
                    )
                })
                .collect(),
        );
    }

    let mut lines = vec![
        "🔍 Quality Screen".to_string(),
        format!("Filter: Williams %R < {} AND Buffett ≥ {}/10", config.threshold, config.min_score),
        String::new(),
    ];

    if opportunities.is_empty() {
        lines.push("No stocks found matching the criteria.".to_string());
    } else {
        lines.push(format!("Top {} Opportunities:", opportunities.len()));
        lines.push(String::new());
        for (i, o) in opportunities.iter().enumerate() {
            lines.push(format!("{}. {} — Combined: {:.1}/10", i + 1, o.signal.ticker, o.combined_score * 10.0));
            lines.push(format!(
                "   %R: {:.1} {} | Buffett: {}/10",
                o.signal.williams_r,
                o.signal.intensity.emoji(),
                o.report.pass_count()
            ));
            lines.push(String::new());
        }
    }

    let secs = elapsed.as_secs();
    lines.push(format!("⏱ {}m {}s | Yahoo Finance + SEC EDGAR | {}", secs / 60, secs % 60, DISCLAIMER));
    finish(lines)
}

/// Screener list report. `stored_on` is the date of the list the rows came from.
pub fn render_screener_report(
    rows: &[ScreenerReportRow],
    screener: &str,
    stored_on: NaiveDate,
    format: OutputFormat,
) -> String {
    if format == OutputFormat::Plain {
        return csv_lines(rows.iter().map(|r| {
            vec![
                r.listing.ticker.clone(),
                r.listing.company.clone().unwrap_or_default(),
                r.listing.industry.clone().unwrap_or_default(),
                r.buffett_score(),
                format!("{:.2}", r.pe),
                decimal_or_na(r.williams_r),
                decimal_or_na(r.rsi),
                r.intensity.to_string(),
            ]
        }));
    }

    let mut lines = vec![
        format!("📋 Screener: {} (updated {}, top {} by P/E)", screener, stored_on, rows.len()),
        String::new(),
    ];

    if rows.is_empty() {
        lines.push("No stocks with positive P/E found.".to_string());
    } else {
        lines.push(
            "| Ticker | Company Name | Industry | Buffett Score | P/E Ratio | Williams %R | RSI | Technical Status |"
                .to_string(),
        );
        lines.push("| :--- | :--- | :--- | :--- | :--- | :--- | :--- | :--- |".to_string());
        for r in rows {
            let status = match r.intensity {
                Intensity::Unknown => "N/A".to_string(),
                intensity => format!("{} {}", intensity.emoji(), intensity),
            };
            lines.push(format!(
                "| **{}** | {} | {} | {} | {:.2} | {} | {} | {} |",
                r.listing.ticker,
                r.listing.company.as_deref().unwrap_or("N/A"),
                r.listing.industry.as_deref().unwrap_or("N/A"),
                r.buffett_score(),
                r.pe,
                one_decimal_or_na(r.williams_r),
                one_decimal_or_na(r.rsi),
                status
            ));
        }
    }

    lines.push(String::new());
    lines.push(format!("Data: screener list, SEC EDGAR, Yahoo Finance | {}", DISCLAIMER));
    finish(lines)
}

fn one_decimal_or_na(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "N/A".to_string())
}

fn decimal_or_na(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "N/A".to_string())
}

/// Comma-separated records without a header, quoted where a field needs it
fn csv_lines(records: impl Iterator<Item = Vec<String>>) -> String {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    for record in records {
        if let Err(e) = writer.write_record(&record) {
            warn!("⚠️ Skipping report line: {}", e);
        }
    }
    match writer.into_inner() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("⚠️ Failed to finish report: {}", e);
            String::new()
        }
    }
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
