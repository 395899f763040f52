//! Tri-state rule evaluation over a flat fact mapping.
//!
//! Each test reads only the facts it needs. A missing required input always
//! yields NA; PASS/FAIL is decided on the unrounded value, rounding happens only
//! when the value is displayed.

use std::collections::HashMap;

use crate::facts::NET_INCOME_TAG;
use crate::models::{FactKey, FactMapping, HistoricalSeries, ScoreResult, ScoreStatus, ScoreValue};

/// Number of most recent fiscal years inspected by the earnings stability test
pub const STABILITY_WINDOW: usize = 10;
const STABILITY_MIN_POSITIVE: usize = 8;

/// Comparison applied to a computed value
#[derive(Debug, Clone, Copy, PartialEq)]
enum Rule {
    Above(f64),
    Below(f64),
}

impl Rule {
    fn status(self, value: f64) -> ScoreStatus {
        let passed = match self {
            Rule::Above(threshold) => value > threshold,
            Rule::Below(threshold) => value < threshold,
        };
        if passed {
            ScoreStatus::Pass
        } else {
            ScoreStatus::Fail
        }
    }
}

/// Denominator policy for a ratio
#[derive(Debug, Clone, Copy, PartialEq)]
enum ZeroDenominator {
    /// Non-positive denominator reads as unbounded (no debt is the best case)
    InfiniteIfNotPositive,
    /// Zero denominator reads as unbounded
    InfiniteIfZero,
    /// Zero denominator reads as no return at all
    ZeroIfZero,
}

fn ratio(numerator: f64, denominator: f64, policy: ZeroDenominator) -> f64 {
    match policy {
        ZeroDenominator::InfiniteIfNotPositive if denominator <= 0.0 => f64::INFINITY,
        ZeroDenominator::InfiniteIfZero if denominator == 0.0 => f64::INFINITY,
        ZeroDenominator::ZeroIfZero if denominator == 0.0 => 0.0,
        _ => numerator / denominator,
    }
}

/// Stateless evaluator for the fixed test battery
pub struct ScoringEngine<'a> {
    facts: &'a FactMapping,
    history: &'a HashMap<String, HistoricalSeries>,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(facts: &'a FactMapping, history: &'a HashMap<String, HistoricalSeries>) -> Self {
        Self { facts, history }
    }

    /// Run all tests in their fixed order
    pub fn evaluate_all(&self) -> Vec<ScoreResult> {
        vec![
            self.cash_test(),
            self.debt_to_equity(),
            self.free_cash_flow(),
            self.return_on_equity(),
            self.current_ratio(),
            self.operating_margin(),
            self.asset_turnover(),
            self.interest_coverage(),
            self.earnings_stability(),
            self.capital_allocation(),
        ]
    }

    fn fact(&self, key: FactKey) -> Option<f64> {
        self.facts.get(key)
    }

    pub fn cash_test(&self) -> ScoreResult {
        const NAME: &str = "Cash Test";
        const TARGET: &str = "> 1.0";
        const DESCRIPTION: &str = "Cash & equivalents / Total Debt";

        let (Some(cash), Some(debt)) = (self.fact(FactKey::Cash), self.fact(FactKey::Debt)) else {
            return not_applicable(NAME, TARGET, DESCRIPTION);
        };
        let investments = self.fact(FactKey::Investments).unwrap_or(0.0);

        let value = ratio(cash + investments, debt, ZeroDenominator::InfiniteIfNotPositive);
        scored(NAME, Rule::Above(1.0), ScoreValue::Ratio(value), TARGET, DESCRIPTION)
    }

    pub fn debt_to_equity(&self) -> ScoreResult {
        const NAME: &str = "Debt-to-Equity";
        const TARGET: &str = "< 0.5";
        const DESCRIPTION: &str = "Total Liabilities / Stockholders Equity";

        let (Some(liabilities), Some(equity)) = (self.fact(FactKey::Liabilities), self.fact(FactKey::Equity)) else {
            return not_applicable(NAME, TARGET, DESCRIPTION);
        };

        let value = ratio(liabilities, equity, ZeroDenominator::InfiniteIfZero);
        scored(NAME, Rule::Below(0.5), ScoreValue::Ratio(value), TARGET, DESCRIPTION)
    }

    pub fn free_cash_flow(&self) -> ScoreResult {
        const NAME: &str = "Free Cash Flow Test";
        const TARGET: &str = "> 0.25";
        const DESCRIPTION: &str = "(OCF - CapEx) / Total Debt";

        let (Some(ocf), Some(capex), Some(debt)) = (
            self.fact(FactKey::OperatingCashFlow),
            self.fact(FactKey::Capex),
            self.fact(FactKey::Debt),
        ) else {
            return not_applicable(NAME, TARGET, DESCRIPTION);
        };

        let fcf = ocf - capex.abs();
        let value = ratio(fcf, debt, ZeroDenominator::InfiniteIfNotPositive);
        scored(NAME, Rule::Above(0.25), ScoreValue::Ratio(value), TARGET, DESCRIPTION)
    }

    pub fn return_on_equity(&self) -> ScoreResult {
        const NAME: &str = "Return on Equity";
        const TARGET: &str = "> 15%";
        const DESCRIPTION: &str = "Net Income / Stockholders Equity";

        let (Some(income), Some(equity)) = (self.fact(FactKey::NetIncome), self.fact(FactKey::Equity)) else {
            return not_applicable(NAME, TARGET, DESCRIPTION);
        };

        let value = ratio(income, equity, ZeroDenominator::ZeroIfZero);
        scored(NAME, Rule::Above(0.15), ScoreValue::Percent(value), TARGET, DESCRIPTION)
    }

    pub fn current_ratio(&self) -> ScoreResult {
        const NAME: &str = "Current Ratio";
        const TARGET: &str = "> 1.5";
        const DESCRIPTION: &str = "Current Assets / Current Liabilities";

        let (Some(assets), Some(liabilities)) =
            (self.fact(FactKey::CurrentAssets), self.fact(FactKey::CurrentLiabilities))
        else {
            return not_applicable(NAME, TARGET, DESCRIPTION);
        };

        let value = ratio(assets, liabilities, ZeroDenominator::InfiniteIfZero);
        scored(NAME, Rule::Above(1.5), ScoreValue::Ratio(value), TARGET, DESCRIPTION)
    }

    pub fn operating_margin(&self) -> ScoreResult {
        const NAME: &str = "Operating Margin";
        const TARGET: &str = "> 12%";
        const DESCRIPTION: &str = "Operating Income / Revenue";

        let (Some(oi), Some(revenue)) = (self.fact(FactKey::OperatingIncome), self.fact(FactKey::Revenue)) else {
            return not_applicable(NAME, TARGET, DESCRIPTION);
        };

        let value = ratio(oi, revenue, ZeroDenominator::ZeroIfZero);
        scored(NAME, Rule::Above(0.12), ScoreValue::Percent(value), TARGET, DESCRIPTION)
    }

    pub fn asset_turnover(&self) -> ScoreResult {
        const NAME: &str = "Asset Turnover";
        const TARGET: &str = "> 0.5";
        const DESCRIPTION: &str = "Revenue / Total Assets";

        let (Some(revenue), Some(assets)) = (self.fact(FactKey::Revenue), self.fact(FactKey::Assets)) else {
            return not_applicable(NAME, TARGET, DESCRIPTION);
        };

        let value = ratio(revenue, assets, ZeroDenominator::ZeroIfZero);
        scored(NAME, Rule::Above(0.5), ScoreValue::Ratio(value), TARGET, DESCRIPTION)
    }

    pub fn interest_coverage(&self) -> ScoreResult {
        const NAME: &str = "Interest Coverage";
        const TARGET: &str = "> 3.0";
        const DESCRIPTION: &str = "Operating Income / Interest Expense";

        let Some(oi) = self.fact(FactKey::OperatingIncome) else {
            return not_applicable(NAME, TARGET, DESCRIPTION);
        };

        match self.fact(FactKey::InterestExpense) {
            Some(interest) if interest != 0.0 => {
                let value = oi / interest.abs();
                scored(NAME, Rule::Above(3.0), ScoreValue::Ratio(value), TARGET, DESCRIPTION)
            }
            // Coverage is undefined without interest, and trivially satisfied
            _ => ScoreResult {
                name: NAME,
                status: ScoreStatus::Pass,
                value: ScoreValue::Label("No Interest"),
                target: TARGET,
                description: DESCRIPTION,
            },
        }
    }

    pub fn earnings_stability(&self) -> ScoreResult {
        const NAME: &str = "Earnings Stability";
        const TARGET: &str = ">= 8/10";
        const DESCRIPTION: &str = "Positive Net Income years (last 10)";

        let history = match self.history.get(NET_INCOME_TAG) {
            Some(series) if !series.is_empty() => series,
            _ => return not_applicable(NAME, TARGET, DESCRIPTION),
        };

        let positive = history
            .points
            .iter()
            .take(STABILITY_WINDOW)
            .filter(|p| p.value > 0.0)
            .count();
        let status = if positive >= STABILITY_MIN_POSITIVE {
            ScoreStatus::Pass
        } else {
            ScoreStatus::Fail
        };

        ScoreResult {
            name: NAME,
            status,
            value: ScoreValue::Count { positive, window: STABILITY_WINDOW },
            target: TARGET,
            description: DESCRIPTION,
        }
    }

    /// Return on equity under a capital allocation heading
    pub fn capital_allocation(&self) -> ScoreResult {
        ScoreResult {
            name: "Capital Allocation",
            ..self.return_on_equity()
        }
    }
}

fn not_applicable(name: &'static str, target: &'static str, description: &'static str) -> ScoreResult {
    ScoreResult {
        name,
        status: ScoreStatus::NotApplicable,
        value: ScoreValue::Missing,
        target,
        description,
    }
}

fn scored(
    name: &'static str,
    rule: Rule,
    value: ScoreValue,
    target: &'static str,
    description: &'static str,
) -> ScoreResult {
    let status = match value.as_f64() {
        Some(v) => rule.status(v),
        None => ScoreStatus::NotApplicable,
    };
    ScoreResult { name, status, value, target, description }
}
