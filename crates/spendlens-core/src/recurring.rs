//! Recurring charge detection
//!
//! Groups spend by merchant key and keeps groups whose amounts are stable
//! (low coefficient of variation) and whose median gap lands on a weekly,
//! fortnightly or monthly cadence.

use std::collections::{HashMap, HashSet};

use chrono::Datelike;
use tracing::debug;

use crate::calendar::days_before;
use crate::config::AnalysisConfig;
use crate::models::{CanonicalTransaction, RecurringCharge, RecurringType};
use crate::patterns::latest_timestamp;
use crate::stats::{group_first_seen, mean, median, most_common, sample_stdev};

/// Supported cadences in days, checked in order
const CADENCES: [u32; 3] = [7, 14, 30];
const MONTHLY: u32 = 30;

/// Detect recurring charges, sorted by absolute median amount (largest first)
pub fn detect_recurring(rows: &[CanonicalTransaction], config: &AnalysisConfig) -> Vec<RecurringCharge> {
    let thresholds = &config.thresholds;
    let spend: Vec<&CanonicalTransaction> = rows.iter().filter(|r| r.is_spend).collect();
    let Some(latest) = latest_timestamp(rows) else {
        return Vec::new();
    };
    if spend.is_empty() {
        return Vec::new();
    }

    // Which merchants were active per category recently (any sign)
    let ghost_cutoff = days_before(latest, thresholds.ghost_lookback_days);
    let mut recent_merchants: HashMap<&str, HashSet<&str>> = HashMap::new();
    for row in rows
        .iter()
        .filter(|r| ghost_cutoff.map_or(true, |cutoff| r.timestamp >= cutoff))
    {
        recent_merchants
            .entry(row.category.as_str())
            .or_default()
            .insert(row.merchant_key.as_str());
    }

    let mut recurring = Vec::new();
    for (merchant_key, mut txs) in group_first_seen(spend, |r| r.merchant_key.as_str()) {
        if txs.len() < thresholds.recurring_min_occurrences {
            continue;
        }
        txs.sort_by_key(|r| r.timestamp);

        let amounts: Vec<f64> = txs.iter().map(|r| r.amount_abs).collect();
        let avg = mean(&amounts);
        if avg == 0.0 {
            continue;
        }
        let cv = sample_stdev(&amounts) / avg;
        if cv > thresholds.recurring_cv_threshold {
            continue;
        }

        let intervals: Vec<f64> = txs
            .windows(2)
            .map(|pair| (pair[1].date - pair[0].date).num_days().max(1) as f64)
            .collect();
        if intervals.is_empty() {
            continue;
        }
        let tolerance = thresholds.recurring_interval_tolerance;
        let Some(interval_days) = match_cadence(median(&intervals), tolerance) else {
            continue;
        };

        let days: Vec<f64> = txs.iter().map(|r| r.date.day() as f64).collect();
        let pay_day_of_month = median(&days).round_ties_even() as u32;
        let category = most_common(txs.iter().map(|r| r.category.as_str()))
            .unwrap_or_default()
            .to_string();
        let merchant = most_common(txs.iter().map(|r| r.merchant.as_str()))
            .unwrap_or_default()
            .to_string();
        let median_amount = -median(&amounts);

        let ghost_subscription = interval_days == MONTHLY
            && recent_merchants
                .get(category.as_str())
                .map_or(true, |merchants| merchants.iter().all(|m| *m == merchant_key));

        let kind = if median_amount.abs() > thresholds.rent_amount_threshold
            && (interval_days == MONTHLY || config.categories.is_rent(&category))
        {
            RecurringType::Rent
        } else {
            RecurringType::Subscription
        };

        recurring.push(RecurringCharge {
            merchant,
            merchant_key: merchant_key.to_string(),
            category,
            interval_days,
            median_amount,
            pay_day_of_month,
            occurrences: txs.len(),
            ghost_subscription,
            kind,
            cv,
        });
    }

    recurring.sort_by(|a, b| b.median_amount.abs().total_cmp(&a.median_amount.abs()));

    debug!(
        recurring = recurring.len(),
        ghosts = recurring.iter().filter(|r| r.ghost_subscription).count(),
        "Detected recurring charges"
    );
    recurring
}

/// First cadence within `tolerance` days of the median gap
fn match_cadence(median_gap: f64, tolerance: i64) -> Option<u32> {
    CADENCES
        .into_iter()
        .find(|cadence| (median_gap - *cadence as f64).abs() <= tolerance as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawTransaction;
    use crate::normalize::normalize;

    fn detect(raw: &[RawTransaction]) -> Vec<RecurringCharge> {
        let config = AnalysisConfig::default();
        let rows = normalize(raw, &config).unwrap();
        detect_recurring(&rows, &config)
    }

    fn tx(ts: &str, amount: f64, merchant: &str, category: &str) -> RawTransaction {
        RawTransaction::new(ts, amount, merchant, category)
    }

    #[test]
    fn test_monthly_subscription() {
        // exactly 30 days apart
        let found = detect(&[
            tx("2024-01-05T08:00:00Z", -9.99, "Netflix", "entertainment"),
            tx("2024-02-04T08:00:00Z", -9.99, "Netflix", "entertainment"),
            tx("2024-03-05T08:00:00Z", -9.99, "Netflix", "entertainment"),
        ]);

        assert_eq!(found.len(), 1);
        let charge = &found[0];
        assert_eq!(charge.merchant, "Netflix");
        assert_eq!(charge.merchant_key, "netflix");
        assert_eq!(charge.interval_days, 30);
        assert_eq!(charge.kind, RecurringType::Subscription);
        assert_eq!(charge.median_amount, -9.99);
        assert_eq!(charge.occurrences, 3);
        assert_eq!(charge.pay_day_of_month, 5);
        assert!(charge.cv < 1e-9);
        assert!(charge.ghost_subscription);
    }

    #[test]
    fn test_not_ghost_when_category_has_other_activity() {
        let found = detect(&[
            tx("2024-01-05T08:00:00Z", -9.99, "Netflix", "entertainment"),
            tx("2024-02-04T08:00:00Z", -9.99, "Netflix", "entertainment"),
            tx("2024-03-05T08:00:00Z", -9.99, "Netflix", "entertainment"),
            tx("2024-03-01T20:00:00Z", -12.00, "Cinema", "entertainment"),
        ]);
        assert_eq!(found.len(), 1);
        assert!(!found[0].ghost_subscription);
    }

    #[test]
    fn test_rent_classification() {
        let found = detect(&[
            tx("2024-01-01T08:00:00Z", -950.0, "Landlord Ltd", "rent"),
            tx("2024-02-01T08:00:00Z", -950.0, "Landlord Ltd", "rent"),
            tx("2024-03-02T08:00:00Z", -950.0, "Landlord Ltd", "rent"),
        ]);
        assert_eq!(found[0].kind, RecurringType::Rent);
        assert_eq!(found[0].interval_days, 30);
    }

    #[test]
    fn test_rent_category_on_fortnightly_cadence() {
        let found = detect(&[
            tx("2024-01-01T08:00:00Z", -450.0, "Flat Share", "housing.rent"),
            tx("2024-01-15T08:00:00Z", -450.0, "Flat Share", "housing.rent"),
            tx("2024-01-29T08:00:00Z", -450.0, "Flat Share", "housing.rent"),
        ]);
        assert_eq!(found[0].interval_days, 14);
        assert_eq!(found[0].kind, RecurringType::Rent);
        assert!(!found[0].ghost_subscription);
    }

    #[test]
    fn test_large_non_monthly_charge_is_subscription() {
        let found = detect(&[
            tx("2024-01-01T08:00:00Z", -250.0, "Gym", "fitness"),
            tx("2024-01-08T08:00:00Z", -250.0, "Gym", "fitness"),
            tx("2024-01-15T08:00:00Z", -250.0, "Gym", "fitness"),
        ]);
        assert_eq!(found[0].interval_days, 7);
        assert_eq!(found[0].kind, RecurringType::Subscription);
    }

    #[test]
    fn test_unstable_amounts_are_skipped() {
        let found = detect(&[
            tx("2024-01-05T08:00:00Z", -10.0, "Corner Shop", "misc"),
            tx("2024-02-04T08:00:00Z", -25.0, "Corner Shop", "misc"),
            tx("2024-03-05T08:00:00Z", -60.0, "Corner Shop", "misc"),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_needs_minimum_occurrences() {
        let found = detect(&[
            tx("2024-01-05T08:00:00Z", -9.99, "Netflix", "entertainment"),
            tx("2024-02-04T08:00:00Z", -9.99, "Netflix", "entertainment"),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_cadence_tolerance() {
        assert_eq!(match_cadence(32.0, 2), Some(30));
        assert_eq!(match_cadence(33.0, 2), None);
        assert_eq!(match_cadence(9.0, 2), Some(7));
        assert_eq!(match_cadence(12.0, 2), Some(14));
        assert_eq!(match_cadence(1.0, 2), None);
    }

    #[test]
    fn test_sorted_by_absolute_amount() {
        let mut raw = Vec::new();
        for (merchant, amount) in [("Spotify", -11.99), ("Landlord", -900.0), ("Phone", -25.0)] {
            for ts in ["2024-01-10T08:00:00Z", "2024-02-09T08:00:00Z", "2024-03-10T08:00:00Z"] {
                raw.push(tx(ts, amount, merchant, merchant));
            }
        }
        let found = detect(&raw);
        let merchants: Vec<&str> = found.iter().map(|r| r.merchant.as_str()).collect();
        assert_eq!(merchants, vec!["Landlord", "Phone", "Spotify"]);
    }

    #[test]
    fn test_display_name_is_most_common() {
        let found = detect(&[
            tx("2024-01-05T08:00:00Z", -5.0, "NETFLIX", "entertainment"),
            tx("2024-02-04T08:00:00Z", -5.0, "Netflix", "entertainment"),
            tx("2024-03-05T08:00:00Z", -5.0, "Netflix", "entertainment"),
        ]);
        assert_eq!(found[0].merchant, "Netflix");
    }

    #[test]
    fn test_empty_input() {
        assert!(detect(&[]).is_empty());
    }
}
