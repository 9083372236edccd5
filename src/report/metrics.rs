//! Coverage, yield and reorder arithmetic for estimated report rows.
//!
//! Every division goes through [`safe_div`]; an undefined quotient is `None`
//! instead of NaN/Inf. Rounding is half-to-even.

use super::{ReorderPolicy, SupplyStatus};

/// Share of the theoretical yield used as the nominal page coverage (5%).
pub const COVERAGE_SHARE: f64 = 0.05;

/// Quotient of `numerator / denominator`, or `None` when the denominator is
/// zero or the result is not finite.
pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let quotient = numerator / denominator;
    quotient.is_finite().then_some(quotient)
}

/// Round half-to-even at `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Pages attributed to a consumable: a current one still has `pages_left` to go,
/// a replaced one only printed what was monitored.
fn pages_accounted(status: SupplyStatus, impressions: f64, pages_left: f64) -> f64 {
    match status {
        SupplyStatus::Current => impressions + pages_left,
        SupplyStatus::Superseded => impressions,
    }
}

/// "Cobertura Suministro": nominal coverage of the consumable as a percentage.
pub fn coverage_pct(status: SupplyStatus, yield_pages: f64, impressions: f64, pages_left: f64) -> Option<f64> {
    safe_div(COVERAGE_SHARE * yield_pages, pages_accounted(status, impressions, pages_left))
        .map(|v| round_to(v * 100.0, 2))
        .filter(|v| v.is_finite())
}

/// "Rendimiento Consumible": pages accounted for relative to the theoretical yield.
pub fn yield_pct(status: SupplyStatus, yield_pages: f64, impressions: f64, pages_left: f64) -> Option<f64> {
    safe_div(pages_accounted(status, impressions, pages_left), yield_pages)
        .map(|v| round_to(v * 100.0, 2))
        .filter(|v| v.is_finite())
}

/// Impressions per monitored day; 0 when nothing was monitored.
pub fn consumption_rate(impressions: f64, days_monitored: f64) -> f64 {
    safe_div(impressions, days_monitored).unwrap_or(0.0)
}

/// Units to reorder for a slot. Only current consumables at or below the
/// threshold get a recommendation.
///
/// Unlike the other counters, a missing `days_left` is not read as 0: an
/// unknown remaining life never qualifies, so the result is 0.
pub fn reorder_recommendation(
    policy: &ReorderPolicy,
    status: SupplyStatus,
    days_left: Option<i64>,
    consumption_rate: f64,
) -> u64 {
    let Some(days_left) = days_left else { return 0 };
    if status != SupplyStatus::Current || days_left > policy.threshold_days {
        return 0;
    }

    let raw = consumption_rate * (policy.target_days - days_left) as f64 * policy.adjustment_factor;
    if !raw.is_finite() {
        return 0;
    }
    let rounded = raw.round_ties_even();
    if rounded <= 0.0 { 0 } else { rounded as u64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_div_rejects_zero_and_non_finite() {
        assert_eq!(safe_div(10.0, 4.0), Some(2.5));
        assert_eq!(safe_div(1.0, 0.0), None);
        assert_eq!(safe_div(0.0, 0.0), None);
        assert_eq!(safe_div(f64::MAX, f64::MIN_POSITIVE), None);
        assert_eq!(safe_div(f64::NAN, 1.0), None);
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(1.234, 2), 1.23);
        assert_eq!(round_to(1.236, 2), 1.24);
    }

    #[test]
    fn current_coverage_includes_remaining_pages() {
        assert_eq!(coverage_pct(SupplyStatus::Current, 5000.0, 200.0, 4800.0), Some(5.0));
        assert_eq!(yield_pct(SupplyStatus::Current, 5000.0, 200.0, 4800.0), Some(100.0));
    }

    #[test]
    fn superseded_coverage_uses_impressions_only() {
        assert_eq!(coverage_pct(SupplyStatus::Superseded, 5000.0, 1000.0, 500.0), Some(25.0));
        assert_eq!(yield_pct(SupplyStatus::Superseded, 5000.0, 1000.0, 500.0), Some(20.0));
    }

    #[test]
    fn degenerate_percentages_are_undefined() {
        assert_eq!(coverage_pct(SupplyStatus::Superseded, 5000.0, 0.0, 0.0), None);
        assert_eq!(coverage_pct(SupplyStatus::Current, 5000.0, 0.0, 0.0), None);
        assert_eq!(yield_pct(SupplyStatus::Current, 0.0, 10.0, 10.0), None);
        // a missing yield still divides cleanly for coverage
        assert_eq!(coverage_pct(SupplyStatus::Current, 0.0, 10.0, 10.0), Some(0.0));
    }

    #[test]
    fn consumption_rate_is_zero_without_monitored_days() {
        assert_eq!(consumption_rate(200.0, 10.0), 20.0);
        assert_eq!(consumption_rate(200.0, 0.0), 0.0);
        assert_eq!(consumption_rate(0.0, 0.0), 0.0);
    }

    #[test]
    fn reorder_only_for_current_within_threshold() {
        let policy = ReorderPolicy::default();
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, Some(25), 20.0), 130);
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, Some(30), 20.0), 120);
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, Some(31), 20.0), 0);
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Superseded, Some(5), 20.0), 0);
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, None, 20.0), 0);
    }

    #[test]
    fn unknown_days_left_is_not_zero_days_left() {
        let policy = ReorderPolicy::default();
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, Some(0), 20.0), 180);
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, None, 20.0), 0);
    }

    #[test]
    fn reorder_never_negative_or_non_finite() {
        let policy = ReorderPolicy::default();
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, Some(10), -5.0), 0);
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, Some(10), f64::NAN), 0);
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, Some(10), f64::INFINITY), 0);

        let odd = ReorderPolicy {
            target_days: 20,
            ..ReorderPolicy::default()
        };
        assert_eq!(reorder_recommendation(&odd, SupplyStatus::Current, Some(30), 50.0), 0);
    }

    #[test]
    fn reorder_rounds_half_to_even() {
        let policy = ReorderPolicy::default();
        // 5 * 85 * 0.1 = 42.5
        assert_eq!(reorder_recommendation(&policy, SupplyStatus::Current, Some(5), 5.0), 42);
    }
}
