//! Spend anomaly detection
//!
//! Three independent detectors whose results are concatenated:
//! - Rolling weekly spikes per category (z-score plus week-over-week jump)
//! - Single transactions at or above the batch-wide spend percentile
//! - Near-duplicate charges (same merchant and amount within a short window)

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::calendar::WeekKey;
use crate::config::AnalysisConfig;
use crate::models::{AnomalyEvent, AnomalyReason, CanonicalTransaction};
use crate::stats::{group_first_seen, mean, pct_change, percentile, sample_stdev};

/// Run every detector over the spend rows
pub fn detect_anomalies(rows: &[CanonicalTransaction], config: &AnalysisConfig) -> Vec<AnomalyEvent> {
    let spend: Vec<&CanonicalTransaction> = rows.iter().filter(|r| r.is_spend).collect();
    if spend.is_empty() {
        return Vec::new();
    }

    let mut anomalies = rolling_spikes(&spend, config);
    let spikes = anomalies.len();
    anomalies.extend(percentile_outliers(&spend, config));
    let outliers = anomalies.len() - spikes;
    anomalies.extend(near_duplicates(&spend, config));

    debug!(
        spikes,
        outliers,
        duplicates = anomalies.len() - spikes - outliers,
        "Detected anomalies"
    );
    anomalies
}

/// Weekly category totals scored against a trailing window
///
/// A week needs at least two prior weeks in the window. The window statistics
/// include the week being scored, so a lone spike over a flat history still
/// produces a finite z-score, but that z can never exceed `(n - 1) / sqrt(n)`
/// for a window of `n` weeks. With the default z threshold of 2.0 a spike
/// therefore needs at least five prior weeks to be reported.
fn rolling_spikes(spend: &[&CanonicalTransaction], config: &AnalysisConfig) -> Vec<AnomalyEvent> {
    let thresholds = &config.thresholds;
    let mut events = Vec::new();

    for (category, txs) in group_first_seen(spend.iter().copied(), |r| r.category.as_str()) {
        let mut weekly: BTreeMap<WeekKey, f64> = BTreeMap::new();
        for row in txs {
            *weekly.entry(row.week_key).or_default() += row.amount_abs;
        }
        let weeks: Vec<(WeekKey, f64)> = weekly.into_iter().collect();

        for idx in 1..weeks.len() {
            let start = idx.saturating_sub(thresholds.anomaly_window_weeks);
            if idx - start < 2 {
                continue;
            }

            let window: Vec<f64> = weeks[start..=idx].iter().map(|(_, v)| *v).collect();
            let stdev = sample_stdev(&window);
            if stdev == 0.0 {
                continue;
            }

            let (week, current) = weeks[idx];
            let z = (current - mean(&window)) / stdev;
            let jump = pct_change(current, weeks[idx - 1].1).unwrap_or(0.0);
            if z > thresholds.anomaly_z_threshold && jump > thresholds.anomaly_week_delta {
                events.push(AnomalyEvent {
                    category: category.to_string(),
                    period: week.to_string(),
                    amount: current,
                    reason: AnomalyReason::SpikeVsRolling,
                    z: Some(z),
                    merchant: None,
                });
            }
        }
    }
    events
}

/// Non-rent transactions at or above the configured spend percentile
fn percentile_outliers(spend: &[&CanonicalTransaction], config: &AnalysisConfig) -> Vec<AnomalyEvent> {
    let candidates: Vec<&&CanonicalTransaction> = spend
        .iter()
        .filter(|r| !config.categories.is_rent(&r.category))
        .collect();
    let values: Vec<f64> = candidates.iter().map(|r| r.amount_abs).collect();
    let cutoff = percentile(&values, config.thresholds.outlier_percentile);
    if cutoff <= 0.0 {
        return Vec::new();
    }

    candidates
        .into_iter()
        .filter(|r| r.amount_abs >= cutoff && r.amount_abs > 0.0)
        .map(|r| AnomalyEvent {
            category: r.category.clone(),
            period: r.ts.clone(),
            amount: r.amount_abs,
            reason: AnomalyReason::SingleDaySpike,
            z: None,
            merchant: Some(r.merchant.clone()),
        })
        .collect()
}

/// Same merchant and amount (to the cent) within the duplicate window
fn near_duplicates(spend: &[&CanonicalTransaction], config: &AnalysisConfig) -> Vec<AnomalyEvent> {
    let mut ordered = spend.to_vec();
    ordered.sort_by_key(|r| r.timestamp);

    let mut seen: HashMap<(&str, i64), DateTime<FixedOffset>> = HashMap::new();
    let mut events = Vec::new();
    for row in ordered {
        let cents = (row.amount * 100.0).round_ties_even() as i64;
        let key = (row.merchant_key.as_str(), cents);
        if let Some(previous) = seen.get(&key) {
            let gap = (row.timestamp - *previous).num_seconds().abs();
            if gap <= config.thresholds.duplicate_window_secs {
                events.push(AnomalyEvent {
                    category: row.category.clone(),
                    period: row.ts.clone(),
                    amount: row.amount_abs,
                    reason: AnomalyReason::PotentialDuplicate,
                    z: None,
                    merchant: Some(row.merchant.clone()),
                });
            }
        }
        seen.insert(key, row.timestamp);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawTransaction;
    use crate::normalize::normalize;

    fn detect(raw: &[RawTransaction]) -> Vec<AnomalyEvent> {
        let config = AnalysisConfig::default();
        let rows = normalize(raw, &config).unwrap();
        detect_anomalies(&rows, &config)
    }

    fn tx(ts: &str, amount: f64, merchant: &str, category: &str) -> RawTransaction {
        RawTransaction::new(ts, amount, merchant, category)
    }

    fn weekly(amounts: &[f64], category: &str) -> Vec<RawTransaction> {
        // Mondays starting 2024-01-01 (ISO 2024-W01)
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::weeks(i as i64);
                tx(&format!("{}T12:00:00Z", date), -amount, "Shop", category)
            })
            .collect()
    }

    fn with_reason(events: &[AnomalyEvent], reason: AnomalyReason) -> Vec<&AnomalyEvent> {
        events.iter().filter(|e| e.reason == reason).collect()
    }

    #[test]
    fn test_spike_vs_rolling() {
        let events = detect(&weekly(&[100.0, 100.0, 100.0, 100.0, 100.0, 300.0], "groceries"));
        let spikes = with_reason(&events, AnomalyReason::SpikeVsRolling);

        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].period, "2024-W06");
        assert_eq!(spikes[0].amount, 300.0);
        assert_eq!(spikes[0].category, "groceries");
        assert!(spikes[0].z.unwrap() > 2.0);
    }

    #[test]
    fn test_flat_series_never_spikes() {
        let events = detect(&weekly(&[50.0; 8], "groceries"));
        assert!(with_reason(&events, AnomalyReason::SpikeVsRolling).is_empty());
    }

    #[test]
    fn test_spike_needs_two_prior_weeks() {
        let events = detect(&weekly(&[10.0, 500.0], "groceries"));
        assert!(with_reason(&events, AnomalyReason::SpikeVsRolling).is_empty());
    }

    #[test]
    fn test_short_history_caps_z_score() {
        // Window of 4 weeks tops out at z = 3 / sqrt(4) = 1.5
        let events = detect(&weekly(&[100.0, 100.0, 100.0, 10_000.0], "groceries"));
        assert!(with_reason(&events, AnomalyReason::SpikeVsRolling).is_empty());

        let events = detect(&weekly(&[100.0, 100.0, 100.0, 100.0, 10_000.0], "groceries"));
        assert!(with_reason(&events, AnomalyReason::SpikeVsRolling).is_empty());
    }

    #[test]
    fn test_percentile_outlier_skips_rent() {
        let mut raw = weekly(&[20.0, 22.0, 25.0, 21.0, 400.0], "eating_out");
        raw.push(tx("2024-01-02T09:00:00Z", -1200.0, "Landlord", "rent"));

        let events = detect(&raw);
        let outliers = with_reason(&events, AnomalyReason::SingleDaySpike);
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].amount, 400.0);
        assert_eq!(outliers[0].period, "2024-01-29T12:00:00Z");
        assert_eq!(outliers[0].merchant.as_deref(), Some("Shop"));
    }

    #[test]
    fn test_near_duplicates() {
        let events = detect(&[
            tx("2024-03-01T12:00:00Z", -19.99, "Amazon", "shopping"),
            tx("2024-03-01T12:04:59Z", -19.99, "AMAZON", "shopping"),
            tx("2024-03-01T12:20:00Z", -19.99, "Amazon", "shopping"),
            tx("2024-03-01T12:21:00Z", -20.00, "Amazon", "shopping"),
        ]);
        let dupes = with_reason(&events, AnomalyReason::PotentialDuplicate);
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].period, "2024-03-01T12:04:59Z");
        assert_eq!(dupes[0].merchant.as_deref(), Some("AMAZON"));
        assert_eq!(dupes[0].amount, 19.99);
    }

    #[test]
    fn test_duplicate_window_boundary() {
        let events = detect(&[
            tx("2024-03-01T12:00:00Z", -5.0, "Cafe", "dining.coffee"),
            tx("2024-03-01T12:05:00Z", -5.0, "Cafe", "dining.coffee"),
            tx("2024-03-01T12:10:01Z", -5.0, "Cafe", "dining.coffee"),
        ]);
        let dupes = with_reason(&events, AnomalyReason::PotentialDuplicate);
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].period, "2024-03-01T12:05:00Z");
    }

    #[test]
    fn test_empty_input() {
        assert!(detect(&[]).is_empty());
        assert!(detect(&[tx("2024-03-01T12:00:00Z", 10.0, "Employer", "salary")]).is_empty());
    }
}
