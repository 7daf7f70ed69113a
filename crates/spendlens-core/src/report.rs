//! Pipeline orchestration and the final report
//!
//! [`Analyzer`] runs every stage over one batch: normalize first, then the
//! independent stages (trends, patterns, recurring, anomalies, variances),
//! then the joins (suggestions, challenges, summary).

use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anomalies::detect_anomalies;
use crate::calendar::MonthKey;
use crate::challenges::build_challenges;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::models::{AnomalyEvent, CanonicalTransaction, Challenge, RawTransaction, RecurringCharge, Suggestion};
use crate::normalize::normalize;
use crate::patterns::{latest_timestamp, mine_patterns, CashflowSqueeze, Patterns, SmallLeakWeek, TimeBucketShares};
use crate::recurring::detect_recurring;
use crate::stats::pct_change;
use crate::suggestions::build_suggestions;
use crate::trends::{compute_trends, Trends};
use crate::variance::{compute_variances, Variances};

const SUMMARY_TOP_N: usize = 3;
const SPEND_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RisingCategory {
    pub category: String,
    pub mom_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingOpportunity {
    pub category: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// `"<first-month> to <last-month>"`, empty for an empty batch
    pub period: String,
    pub total_spend_30d: f64,
    pub projected_spend_curr_month: f64,
    pub top_rising_categories: Vec<RisingCategory>,
    pub top_saving_opportunities: Vec<SavingOpportunity>,
}

/// The pattern subset published in the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportPatterns {
    /// Weekdays listed Monday..Sunday; categories alphabetical, not first-seen
    pub dow_peaks: BTreeMap<String, Vec<String>>,
    pub time_buckets: BTreeMap<String, TimeBucketShares>,
    pub merchant_hhi: BTreeMap<String, f64>,
    pub small_leaks: Vec<SmallLeakWeek>,
    pub cashflow_squeezes: Vec<CashflowSqueeze>,
}

impl From<&Patterns> for ReportPatterns {
    fn from(patterns: &Patterns) -> Self {
        Self {
            dow_peaks: patterns.dow_peaks.clone(),
            time_buckets: patterns.time_buckets.clone(),
            merchant_hhi: patterns.merchant_hhi.clone(),
            small_leaks: patterns.small_leaks.clone(),
            cashflow_squeezes: patterns.cashflow.squeezes.clone(),
        }
    }
}

/// Final analytical report; every field always present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: Summary,
    pub patterns: ReportPatterns,
    pub recurring: Vec<RecurringCharge>,
    pub anomalies: Vec<AnomalyEvent>,
    /// Generator order; within a generator, categories run alphabetically
    pub suggestions: Vec<Suggestion>,
    pub challenges: Vec<Challenge>,
}

/// Every intermediate stage output alongside the report
#[derive(Debug, Clone)]
pub struct Analysis {
    pub rows: Vec<CanonicalTransaction>,
    pub trends: Trends,
    pub patterns: Patterns,
    pub variances: Variances,
    pub report: Report,
}

/// Runs the full pipeline with one immutable configuration
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalysisConfig,
    baselines: Option<BTreeMap<String, f64>>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AnalysisConfig) -> Self {
        Self {
            config,
            baselines: None,
        }
    }

    /// Per-category monthly baselines that override computed ones
    pub fn with_baselines(mut self, baselines: BTreeMap<String, f64>) -> Self {
        self.baselines = Some(baselines);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse a batch and return only the report
    pub fn analyse(&self, transactions: &[RawTransaction]) -> Result<Report> {
        Ok(self.run(transactions)?.report)
    }

    /// Analyse a batch, keeping every stage output
    pub fn run(&self, transactions: &[RawTransaction]) -> Result<Analysis> {
        let config = &self.config;
        let rows = normalize(transactions, config)?;

        let trends = compute_trends(&rows);
        let patterns = mine_patterns(&rows, config);
        let recurring = detect_recurring(&rows, config);
        let anomalies = detect_anomalies(&rows, config);
        let variances = compute_variances(&rows, self.baselines.as_ref(), config);

        let suggestions = build_suggestions(&patterns, &recurring, config);
        let challenges = build_challenges(&suggestions, &patterns, &variances, config);

        let report = Report {
            summary: summarise(&rows, &trends, &variances, config),
            patterns: ReportPatterns::from(&patterns),
            recurring,
            anomalies,
            suggestions,
            challenges,
        };

        info!(
            transactions = rows.len(),
            recurring = report.recurring.len(),
            anomalies = report.anomalies.len(),
            suggestions = report.suggestions.len(),
            challenges = report.challenges.len(),
            "Analysis complete"
        );

        Ok(Analysis {
            rows,
            trends,
            patterns,
            variances,
            report,
        })
    }
}

/// Headline numbers for the report
pub fn summarise(
    rows: &[CanonicalTransaction],
    trends: &Trends,
    variances: &Variances,
    config: &AnalysisConfig,
) -> Summary {
    let months: BTreeSet<MonthKey> = rows.iter().map(|r| r.month_key).collect();
    let period = match (months.first(), months.last()) {
        (Some(first), Some(last)) => format!("{} to {}", first, last),
        _ => String::new(),
    };

    let total_spend_30d = latest_timestamp(rows).map_or(0.0, |latest| {
        let cutoff = latest - Duration::days(SPEND_WINDOW_DAYS);
        rows.iter()
            .filter(|r| r.is_spend && r.timestamp >= cutoff)
            .map(|r| r.amount_abs)
            .sum()
    });

    Summary {
        period,
        total_spend_30d,
        projected_spend_curr_month: variances.total_projection,
        top_rising_categories: top_rising_categories(trends, config),
        top_saving_opportunities: top_saving_opportunities(variances),
    }
}

fn top_rising_categories(trends: &Trends, config: &AnalysisConfig) -> Vec<RisingCategory> {
    let months = &trends.monthly_spend.months;
    if months.len() < 2 {
        return Vec::new();
    }
    let (curr_idx, prev_idx) = (months.len() - 1, months.len() - 2);

    let mut rising: Vec<RisingCategory> = trends
        .category_spend
        .iter()
        .filter_map(|(category, series)| {
            let curr = series.values[curr_idx];
            if curr < config.thresholds.rising_min_spend {
                return None;
            }
            let change = pct_change(curr, series.values[prev_idx])?;
            (change >= config.thresholds.rising_mom_threshold).then(|| {
                RisingCategory {
                    category: category.clone(),
                    mom_pct: change,
                }
            })
        })
        .collect();

    rising.sort_by(|a, b| b.mom_pct.total_cmp(&a.mom_pct));
    rising.truncate(SUMMARY_TOP_N);
    rising
}

fn top_saving_opportunities(variances: &Variances) -> Vec<SavingOpportunity> {
    let mut opportunities: Vec<SavingOpportunity> = variances
        .per_category
        .iter()
        .filter(|(_, v)| v.opportunity != 0.0)
        .map(|(category, v)| SavingOpportunity {
            category: category.clone(),
            amount: v.opportunity,
        })
        .collect();

    opportunities.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    opportunities.truncate(SUMMARY_TOP_N);
    opportunities
}
