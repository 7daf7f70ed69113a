//! Category variance and savings opportunity sizing
//!
//! Compares each category's pro-rated current-month spend against a baseline
//! built from the preceding months (or supplied by the caller).

use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::MonthKey;
use crate::config::AnalysisConfig;
use crate::models::CanonicalTransaction;
use crate::stats::{median, pct_change};

/// Number of prior months considered for a computed baseline
const BASELINE_MONTHS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVariance {
    pub baseline: f64,
    /// Current-month spend scaled to a full month
    pub projection: f64,
    pub variance: f64,
    pub opportunity: f64,
    pub spent_so_far: f64,
    pub day_of_month: u32,
    pub mom_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variances {
    pub per_category: BTreeMap<String, CategoryVariance>,
    /// Latest month with any spend
    pub current_month: Option<MonthKey>,
    pub total_projection: f64,
    pub total_baseline: f64,
}

/// Size per-category variance against baselines (supplied ones win)
pub fn compute_variances(
    rows: &[CanonicalTransaction],
    baselines: Option<&BTreeMap<String, f64>>,
    config: &AnalysisConfig,
) -> Variances {
    let spend: Vec<&CanonicalTransaction> = rows.iter().filter(|r| r.is_spend).collect();
    let months: Vec<MonthKey> = spend
        .iter()
        .map(|r| r.month_key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let Some((&current_month, earlier)) = months.split_last() else {
        return Variances::default();
    };
    let previous_months = &earlier[earlier.len().saturating_sub(BASELINE_MONTHS)..];

    let mut category_monthly: BTreeMap<&str, BTreeMap<MonthKey, f64>> = BTreeMap::new();
    for row in &spend {
        *category_monthly
            .entry(row.category.as_str())
            .or_default()
            .entry(row.month_key)
            .or_default() += row.amount_abs;
    }

    let days_in_month = current_month.days_in_month();
    let day_of_month = spend
        .iter()
        .filter(|r| r.month_key == current_month)
        .map(|r| r.date.day())
        .max()
        .unwrap_or(0);
    let cap_ratio = config.thresholds.opportunity_cap_ratio;

    let mut variances = Variances {
        current_month: Some(current_month),
        ..Variances::default()
    };

    for (category, by_month) in category_monthly {
        let month_value = |month: &MonthKey| by_month.get(month).copied().unwrap_or(0.0);

        let baseline = match baselines.and_then(|b| b.get(category)) {
            Some(supplied) => *supplied,
            None => computed_baseline(previous_months.iter().map(month_value).collect()),
        };

        let spent_so_far = month_value(&current_month);
        let projection = if day_of_month > 0 && day_of_month < days_in_month {
            spent_so_far / day_of_month as f64 * days_in_month as f64
        } else {
            spent_so_far
        };
        let variance = projection - baseline;
        let opportunity = if baseline > 0.0 && variance > 0.0 {
            variance.min(baseline * cap_ratio)
        } else {
            0.0
        };
        let mom_pct = previous_months
            .last()
            .and_then(|prev| pct_change(spent_so_far, month_value(prev)));

        variances.total_projection += projection;
        variances.total_baseline += baseline;
        variances.per_category.insert(
            category.to_string(),
            CategoryVariance {
                baseline,
                projection,
                variance,
                opportunity,
                spent_so_far,
                day_of_month,
                mom_pct,
            },
        );
    }

    debug!(
        current_month = %current_month,
        categories = variances.per_category.len(),
        total_projection = variances.total_projection,
        "Sized category variances"
    );
    variances
}

/// Median of non-zero prior months, else the most recent prior month, else zero
fn computed_baseline(history: Vec<f64>) -> f64 {
    let non_zero: Vec<f64> = history.iter().copied().filter(|v| *v > 0.0).collect();
    if !non_zero.is_empty() {
        median(&non_zero)
    } else {
        history.last().copied().unwrap_or(0.0)
    }
}
