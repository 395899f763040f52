//! Resolution of logical financial concepts against raw XBRL company facts.
//!
//! A concept can be reported under several tags depending on the filer and the
//! taxonomy vintage. The resolver walks a fixed namespace priority list, then the
//! caller's candidate tags in order, then the unit groups (primary currency
//! first), and returns the most recent entry for the requested form.

use std::collections::{BTreeMap, HashSet};

use crate::models::{
    FactEntry, FactKey, FactMapping, FilingsDocument, HistoricalPoint, HistoricalSeries, Provenance,
    TagFacts,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const NET_INCOME_TAG: &str = "NetIncomeLoss";

/// Reporting granularity, mapped to the filing form that carries it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodGranularity {
    #[default]
    Annual,
    Quarterly,
}

impl PeriodGranularity {
    pub fn form(&self) -> &'static str {
        match self {
            PeriodGranularity::Annual => "10-K",
            PeriodGranularity::Quarterly => "10-Q",
        }
    }
}

/// Candidate tags for each logical fact, in preference order
#[derive(Debug, Clone, PartialEq)]
pub struct TagMap {
    entries: Vec<(FactKey, Vec<String>)>,
    /// Added on top of long-term debt when present
    short_term_debt: Vec<String>,
}

impl TagMap {
    pub fn new(entries: Vec<(FactKey, Vec<String>)>, short_term_debt: Vec<String>) -> Self {
        Self { entries, short_term_debt }
    }

    pub fn candidates(&self, key: FactKey) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, tags)| tags.as_slice())
            .unwrap_or(&[])
    }

    pub fn entries(&self) -> impl Iterator<Item = (FactKey, &[String])> {
        self.entries.iter().map(|(k, tags)| (*k, tags.as_slice()))
    }

    pub fn short_term_debt(&self) -> &[String] {
        &self.short_term_debt
    }
}

impl Default for TagMap {
    fn default() -> Self {
        fn tags(list: &[&str]) -> Vec<String> {
            list.iter().map(|t| t.to_string()).collect()
        }

        Self {
            entries: vec![
                (FactKey::Cash, tags(&["CashAndCashEquivalentsAtCarryingValue"])),
                (FactKey::Investments, tags(&["ShortTermInvestments"])),
                (FactKey::Debt, tags(&["LongTermDebt", "LongTermDebtNoncurrent"])),
                (FactKey::Liabilities, tags(&["Liabilities"])),
                (FactKey::Equity, tags(&["StockholdersEquity"])),
                (FactKey::OperatingCashFlow, tags(&["NetCashProvidedByUsedInOperatingActivities"])),
                (FactKey::Capex, tags(&["PaymentsToAcquirePropertyPlantAndEquipment"])),
                (FactKey::NetIncome, tags(&[NET_INCOME_TAG])),
                (FactKey::CurrentAssets, tags(&["AssetsCurrent"])),
                (FactKey::CurrentLiabilities, tags(&["LiabilitiesCurrent"])),
                (FactKey::OperatingIncome, tags(&["OperatingIncomeLoss"])),
                (
                    FactKey::Revenue,
                    tags(&[
                        "Revenues",
                        "RevenueFromContractWithCustomerExcludingAssessedTax",
                        "SalesRevenueNet",
                    ]),
                ),
                (FactKey::Assets, tags(&["Assets"])),
                (FactKey::InterestExpense, tags(&["InterestExpense"])),
            ],
            short_term_debt: tags(&["ShortTermBorrowings"]),
        }
    }
}

/// Namespace priority and unit preference
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub namespaces: Vec<String>,
    pub primary_unit: String,
    pub granularity: PeriodGranularity,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            namespaces: vec!["us-gaap".to_string(), "dei".to_string()],
            primary_unit: "USD".to_string(),
            granularity: PeriodGranularity::Annual,
        }
    }
}

/// Facts extracted for one entity, with provenance keyed by fact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFacts {
    pub facts: FactMapping,
    pub provenance: BTreeMap<FactKey, Provenance>,
}

impl ExtractedFacts {
    /// Most recent period end among the resolved facts
    pub fn latest_period_end(&self) -> Option<chrono::NaiveDate> {
        self.provenance.values().map(|p| p.period_end).max()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FactResolver {
    tag_map: TagMap,
    settings: ResolverSettings,
}

impl FactResolver {
    pub fn new(tag_map: TagMap, settings: ResolverSettings) -> Self {
        Self { tag_map, settings }
    }

    pub fn tag_map(&self) -> &TagMap {
        &self.tag_map
    }

    /// Resolve one concept at the configured granularity
    pub fn extract_fact(&self, document: &FilingsDocument, candidates: &[String]) -> Option<(f64, Provenance)> {
        self.extract_fact_for(document, candidates, self.settings.granularity)
    }

    /// Resolve one concept.
    ///
    /// Namespaces are tried in priority order and candidates in caller order;
    /// the first tag holding an entry of the requested form supplies the value.
    /// Values are never combined across tags, units or namespaces.
    pub fn extract_fact_for(
        &self,
        document: &FilingsDocument,
        candidates: &[String],
        granularity: PeriodGranularity,
    ) -> Option<(f64, Provenance)> {
        let form = granularity.form();

        for namespace in &self.settings.namespaces {
            for tag in candidates {
                let Some(facts) = document.tag(namespace, tag) else {
                    continue;
                };

                for (unit, entries) in self.ordered_units(facts) {
                    if let Some(entry) = sorted_by_recency(entries).into_iter().find(|e| e.filing_form == form) {
                        let provenance = Provenance {
                            tag: tag.clone(),
                            label: facts.label.clone(),
                            period_end: entry.period_end,
                            fiscal_year: entry.fiscal_year,
                            unit: unit.to_string(),
                            form: entry.filing_form.clone(),
                        };
                        return Some((entry.value, provenance));
                    }
                }
            }
        }
        None
    }

    /// Annual history of a tag: one value per distinct fiscal year, most recent
    /// first, at most `limit` values.
    pub fn extract_historical_facts(&self, document: &FilingsDocument, tag: &str, limit: usize) -> HistoricalSeries {
        let mut series = HistoricalSeries { tag: tag.to_string(), points: Vec::new() };
        if limit == 0 {
            return series;
        }
        let form = PeriodGranularity::Annual.form();

        for namespace in &self.settings.namespaces {
            let Some(facts) = document.tag(namespace, tag) else {
                continue;
            };

            for (_, entries) in self.ordered_units(facts) {
                let mut seen_years = HashSet::new();
                for entry in sorted_by_recency(entries).into_iter().filter(|e| e.filing_form == form) {
                    if seen_years.insert(entry.fiscal_year) {
                        series.points.push(HistoricalPoint {
                            fiscal_year: entry.fiscal_year,
                            period_end: entry.period_end,
                            value: entry.value,
                        });
                        if series.points.len() >= limit {
                            break;
                        }
                    }
                }
                if !series.points.is_empty() {
                    return series;
                }
            }
        }
        series
    }

    /// Resolve every fact of the tag map.
    ///
    /// Short-term borrowings, when non-zero, are added to long-term debt (or
    /// stand in for it when long-term debt is absent).
    pub fn extract_facts(&self, document: &FilingsDocument) -> ExtractedFacts {
        let mut extracted = ExtractedFacts::default();

        for (key, candidates) in self.tag_map.entries() {
            if let Some((value, provenance)) = self.extract_fact(document, candidates) {
                extracted.facts.set(key, Some(value));
                extracted.provenance.insert(key, provenance);
            }
        }

        if let Some((short_term, provenance)) = self.extract_fact(document, self.tag_map.short_term_debt()) {
            if short_term != 0.0 {
                let long_term = extracted.facts.get(FactKey::Debt).unwrap_or(0.0);
                extracted.facts.set(FactKey::Debt, Some(long_term + short_term));
                extracted.provenance.entry(FactKey::Debt).or_insert(provenance);
            }
        }

        extracted
    }

    /// Unit groups with the primary unit first, the rest in map order
    fn ordered_units<'a>(&'a self, facts: &'a TagFacts) -> Vec<(&'a str, &'a [FactEntry])> {
        let primary = self.settings.primary_unit.as_str();
        let mut units: Vec<(&str, &[FactEntry])> = Vec::with_capacity(facts.units.len());
        if let Some(entries) = facts.units.get(primary) {
            units.push((primary, entries.as_slice()));
        }
        units.extend(
            facts
                .units
                .iter()
                .filter(|(unit, _)| unit.as_str() != primary)
                .map(|(unit, entries)| (unit.as_str(), entries.as_slice())),
        );
        units
    }
}

/// Entries by period end, newest first. Equal dates keep filing order.
fn sorted_by_recency(entries: &[FactEntry]) -> Vec<&FactEntry> {
    let mut sorted: Vec<&FactEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.period_end.cmp(&a.period_end));
    sorted
}
