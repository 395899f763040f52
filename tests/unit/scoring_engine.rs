//! Scoring battery: NA rules, thresholds and documented examples

use pretty_assertions::assert_eq;
use std::collections::HashMap;
use test_log::test;

use stock_scorecard::facts::NET_INCOME_TAG;
use stock_scorecard::models::{FactKey, FactMapping, HistoricalSeries, ScoreStatus, ScoreValue};
use stock_scorecard::scoring::ScoringEngine;

fn history(values: &[f64]) -> HashMap<String, HistoricalSeries> {
    HashMap::from([(NET_INCOME_TAG.to_string(), HistoricalSeries::from_values(NET_INCOME_TAG, values))])
}

/// Every fact present with passing values
fn complete_facts() -> FactMapping {
    FactMapping::new()
        .with(FactKey::Cash, 300.0)
        .with(FactKey::Investments, 50.0)
        .with(FactKey::Debt, 200.0)
        .with(FactKey::Liabilities, 150.0)
        .with(FactKey::Equity, 500.0)
        .with(FactKey::OperatingCashFlow, 180.0)
        .with(FactKey::Capex, -40.0)
        .with(FactKey::NetIncome, 90.0)
        .with(FactKey::CurrentAssets, 400.0)
        .with(FactKey::CurrentLiabilities, 200.0)
        .with(FactKey::OperatingIncome, 150.0)
        .with(FactKey::Revenue, 1000.0)
        .with(FactKey::Assets, 1200.0)
        .with(FactKey::InterestExpense, 10.0)
}

/// Facts each test reads; removing any of them must make that test NA
fn required_inputs(test: &str) -> Vec<FactKey> {
    match test {
        "Cash Test" => vec![FactKey::Cash, FactKey::Debt],
        "Debt-to-Equity" => vec![FactKey::Liabilities, FactKey::Equity],
        "Free Cash Flow Test" => vec![FactKey::OperatingCashFlow, FactKey::Capex, FactKey::Debt],
        "Return on Equity" | "Capital Allocation" => vec![FactKey::NetIncome, FactKey::Equity],
        "Current Ratio" => vec![FactKey::CurrentAssets, FactKey::CurrentLiabilities],
        "Operating Margin" => vec![FactKey::OperatingIncome, FactKey::Revenue],
        "Asset Turnover" => vec![FactKey::Revenue, FactKey::Assets],
        "Interest Coverage" => vec![FactKey::OperatingIncome],
        _ => Vec::new(),
    }
}

#[test]
fn test_complete_facts_pass_everything() {
    let facts = complete_facts();
    let history = history(&[9.0; 10]);
    let results = ScoringEngine::new(&facts, &history).evaluate_all();

    assert_eq!(results.len(), 10);
    for result in &results {
        assert_eq!(result.status, ScoreStatus::Pass, "{} should pass", result.name);
    }
}

#[test]
fn test_missing_required_input_is_na() {
    let history = history(&[9.0; 10]);

    for key in FactKey::ALL {
        let mut facts = complete_facts();
        facts.set(key, None);
        let results = ScoringEngine::new(&facts, &history).evaluate_all();

        for result in results {
            if required_inputs(result.name).contains(&key) {
                assert_eq!(result.status, ScoreStatus::NotApplicable, "{} without {}", result.name, key);
                assert_eq!(result.value, ScoreValue::Missing);
            } else {
                assert_ne!(result.status, ScoreStatus::NotApplicable, "{} without {}", result.name, key);
            }
        }
    }
}

#[test]
fn test_empty_mapping_is_all_na() {
    let facts = FactMapping::new();
    let history = HashMap::new();
    let results = ScoringEngine::new(&facts, &history).evaluate_all();

    assert!(results.iter().all(|r| r.status == ScoreStatus::NotApplicable));
}

#[test]
fn test_cash_test_example() {
    let facts = FactMapping::new()
        .with(FactKey::Cash, 150.0)
        .with(FactKey::Investments, 50.0)
        .with(FactKey::Debt, 100.0);
    let history = HashMap::new();

    let result = ScoringEngine::new(&facts, &history).cash_test();
    assert_eq!(result.value.as_f64(), Some(2.0));
    assert_eq!(result.status, ScoreStatus::Pass);
    assert_eq!(result.target, "> 1.0");
}

#[test]
fn test_interest_coverage_example() {
    let facts = FactMapping::new()
        .with(FactKey::OperatingIncome, 100.0)
        .with(FactKey::InterestExpense, 0.0);
    let history = HashMap::new();

    let result = ScoringEngine::new(&facts, &history).interest_coverage();
    assert_eq!(result.value.to_string(), "No Interest");
    assert_eq!(result.status, ScoreStatus::Pass);
}

#[test]
fn test_interest_coverage_without_interest_fact() {
    let facts = FactMapping::new().with(FactKey::OperatingIncome, -5.0);
    let history = HashMap::new();

    let result = ScoringEngine::new(&facts, &history).interest_coverage();
    assert_eq!(result.status, ScoreStatus::Pass);
    assert_eq!(result.value, ScoreValue::Label("No Interest"));
}

#[test]
fn test_earnings_stability_example() {
    let facts = FactMapping::new();
    let history = history(&[5.0, -3.0, 2.0, 4.0, 1.0, -1.0, 3.0, 6.0, 2.0, 1.0]);

    let result = ScoringEngine::new(&facts, &history).earnings_stability();
    assert_eq!(result.value.to_string(), "8/10");
    assert_eq!(result.status, ScoreStatus::Pass);
}

#[test]
fn test_earnings_stability_short_history_fails() {
    let facts = FactMapping::new();
    let history = history(&[1.0; 7]);

    let result = ScoringEngine::new(&facts, &history).earnings_stability();
    assert_eq!(result.value.to_string(), "7/10");
    assert_eq!(result.status, ScoreStatus::Fail);
}

#[test]
fn test_earnings_stability_empty_history_is_na() {
    let facts = FactMapping::new();
    let history = history(&[]);

    let result = ScoringEngine::new(&facts, &history).earnings_stability();
    assert_eq!(result.status, ScoreStatus::NotApplicable);
}

#[test]
fn test_thresholds_are_strict() {
    let history = HashMap::new();

    // Exactly at the bar is a FAIL for strict inequalities
    let at_bar = FactMapping::new().with(FactKey::Cash, 100.0).with(FactKey::Debt, 100.0);
    assert_eq!(ScoringEngine::new(&at_bar, &history).cash_test().status, ScoreStatus::Fail);

    let leverage = FactMapping::new().with(FactKey::Liabilities, 50.0).with(FactKey::Equity, 100.0);
    assert_eq!(ScoringEngine::new(&leverage, &history).debt_to_equity().status, ScoreStatus::Fail);

    let margin = FactMapping::new().with(FactKey::OperatingIncome, 121.0).with(FactKey::Revenue, 1000.0);
    let result = ScoringEngine::new(&margin, &history).operating_margin();
    assert_eq!(result.status, ScoreStatus::Pass);
    assert_eq!(result.value.to_string(), "12.1%");
}

#[test]
fn test_free_cash_flow_uses_absolute_capex() {
    let facts = FactMapping::new()
        .with(FactKey::OperatingCashFlow, 100.0)
        .with(FactKey::Capex, 60.0)
        .with(FactKey::Debt, 200.0);
    let history = HashMap::new();

    let positive = ScoringEngine::new(&facts, &history).free_cash_flow();
    assert_eq!(positive.value, ScoreValue::Ratio(0.2));
    assert_eq!(positive.status, ScoreStatus::Fail);

    let facts = facts.with(FactKey::Capex, -60.0);
    let negative = ScoringEngine::new(&facts, &history).free_cash_flow();
    assert_eq!(negative.value, positive.value);
}

#[test]
fn test_zero_denominators() {
    let history = HashMap::new();

    let no_debt = FactMapping::new()
        .with(FactKey::OperatingCashFlow, -10.0)
        .with(FactKey::Capex, 0.0)
        .with(FactKey::Debt, 0.0);
    let fcf = ScoringEngine::new(&no_debt, &history).free_cash_flow();
    assert_eq!(fcf.status, ScoreStatus::Pass);
    assert_eq!(fcf.value.to_string(), "inf");

    let no_liabilities = FactMapping::new()
        .with(FactKey::CurrentAssets, 10.0)
        .with(FactKey::CurrentLiabilities, 0.0);
    assert_eq!(
        ScoringEngine::new(&no_liabilities, &history).current_ratio().status,
        ScoreStatus::Pass
    );

    let no_revenue = FactMapping::new()
        .with(FactKey::OperatingIncome, 10.0)
        .with(FactKey::Revenue, 0.0);
    let margin = ScoringEngine::new(&no_revenue, &history).operating_margin();
    assert_eq!(margin.status, ScoreStatus::Fail);
    assert_eq!(margin.value.to_string(), "0.0%");
}
