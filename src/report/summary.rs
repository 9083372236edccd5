//! Dashboard indicators over an estimated report: filters, key figures and the
//! bucketed counts behind the charts.

use super::{EstimatedRow, ReorderPolicy, SupplyStatus};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Days left at or below which a consumable is critical.
pub const DEFAULT_CRITICAL_DAYS: i64 = 10;

/// Row filter; an empty set does not filter on that column.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub customers: BTreeSet<String>,
    pub device_serials: BTreeSet<String>,
    pub types: BTreeSet<String>,
    pub colours: BTreeSet<String>,
    pub statuses: BTreeSet<SupplyStatus>,
    /// Inclusive range; rows without `days_left` fall outside any range.
    pub days_left: Option<(i64, i64)>,
}

fn admits(set: &BTreeSet<String>, value: Option<&str>) -> bool {
    set.is_empty() || value.is_some_and(|v| set.contains(v))
}

impl ReportFilter {
    pub fn for_customer(name: impl Into<String>) -> Self {
        ReportFilter {
            customers: BTreeSet::from([name.into()]),
            ..ReportFilter::default()
        }
    }

    pub fn matches(&self, row: &EstimatedRow) -> bool {
        let c = &row.row.consumable;
        admits(&self.customers, row.row.customer.name.as_deref())
            && admits(&self.device_serials, row.row.device_serial())
            && admits(&self.types, Some(&c.consumable_type))
            && admits(&self.colours, Some(&c.colour))
            && (self.statuses.is_empty() || self.statuses.contains(&row.status))
            && self
                .days_left
                .is_none_or(|(lo, hi)| c.days_left.is_some_and(|d| d >= lo && d <= hi))
    }

    pub fn apply(&self, rows: Vec<EstimatedRow>) -> Vec<EstimatedRow> {
        rows.into_iter().filter(|r| self.matches(r)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Current consumables in monitored devices.
    pub total: usize,
    pub within_threshold: usize,
    pub within_threshold_pct: f64,
    pub critical: usize,
    pub critical_pct: f64,
}

fn share(part: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { part as f64 / total as f64 * 100.0 }
}

fn current_and_monitored(row: &EstimatedRow) -> bool {
    row.is_current() && row.row.device.is_monitored()
}

pub fn summarize(rows: &[EstimatedRow], policy: &ReorderPolicy, critical_days: i64) -> ReportSummary {
    let live: Vec<&EstimatedRow> = rows.iter().filter(|r| current_and_monitored(r)).collect();
    let at_most = |limit: i64| live.iter().filter(|r| r.days_left().is_some_and(|d| d <= limit)).count();

    let total = live.len();
    let within_threshold = at_most(policy.threshold_days);
    let critical = at_most(critical_days);
    ReportSummary {
        total,
        within_threshold,
        within_threshold_pct: share(within_threshold, total),
        critical,
        critical_pct: share(critical, total),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub label: &'static str,
    pub count: usize,
}

/// Counts per remaining-days band: "<30" is [0, 30], the others are
/// left-open. Negative or unknown days are not counted.
pub fn days_left_bands(rows: &[EstimatedRow]) -> Vec<Band> {
    let mut counts = [0usize; 4];
    for days in rows.iter().filter_map(EstimatedRow::days_left) {
        let slot = match days {
            d if d < 0 => continue,
            0..=30 => 0,
            31..=60 => 1,
            61..=90 => 2,
            _ => 3,
        };
        counts[slot] += 1;
    }
    ["<30", "30-60", "60-90", ">=90"]
        .into_iter()
        .zip(counts)
        .map(|(label, count)| Band { label, count })
        .collect()
}

/// Counts per coverage band, right-closed. Undefined or non-positive coverage
/// is not counted.
pub fn coverage_bands(rows: &[EstimatedRow]) -> Vec<Band> {
    const EDGES: [f64; 4] = [5.0, 8.0, 12.0, 20.0];
    let mut counts = [0usize; 5];
    for coverage in rows.iter().filter_map(|r| r.coverage_pct).filter(|c| *c > 0.0) {
        let slot = EDGES.iter().position(|edge| coverage <= *edge).unwrap_or(EDGES.len());
        counts[slot] += 1;
    }
    ["<=5%", "5% - 8%", ">8% - 12%", "12% - 20%", ">20%"]
        .into_iter()
        .zip(counts)
        .map(|(label, count)| Band { label, count })
        .collect()
}

fn sorted_desc<K: Ord>(counts: BTreeMap<K, usize>) -> Vec<(K, usize)> {
    let mut out: Vec<(K, usize)> = counts.into_iter().collect();
    // stable: equal counts keep key order
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}

/// Current monitored consumables that need a reorder, per type.
pub fn reorders_by_type(rows: &[EstimatedRow]) -> Vec<(String, usize)> {
    let mut counts = BTreeMap::new();
    for row in rows
        .iter()
        .filter(|r| current_and_monitored(r) && r.reorder_recommendation > 0)
    {
        *counts.entry(row.row.consumable.consumable_type.clone()).or_insert(0) += 1;
    }
    sorted_desc(counts)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuReorder {
    pub sku: String,
    pub description: String,
    pub count: usize,
}

/// Consumables that need a reorder, per (SKU, description), most frequent first.
pub fn reorders_by_sku(rows: &[EstimatedRow], limit: usize) -> Vec<SkuReorder> {
    let mut counts = BTreeMap::new();
    for row in rows.iter().filter(|r| r.reorder_recommendation > 0) {
        let c = &row.row.consumable;
        let key = (c.sku.clone().unwrap_or_default(), c.description.clone());
        *counts.entry(key).or_insert(0) += 1;
    }
    sorted_desc(counts)
        .into_iter()
        .take(limit)
        .map(|((sku, description), count)| SkuReorder {
            sku,
            description,
            count,
        })
        .collect()
}
