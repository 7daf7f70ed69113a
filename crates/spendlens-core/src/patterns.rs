//! Behavioural pattern mining
//!
//! Detects:
//! - Day-of-week peaks and time-of-day mix per category
//! - Merchant concentration (HHI) over a trailing window
//! - Small-transaction "drip" weeks
//! - Weekly cashflow squeezes (negative week followed by a positive one)
//! - Late-night ordering and ride-hail usage
//!
//! All recency windows are anchored on the latest timestamp in the batch,
//! never on the wall clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::{days_before, weekday_name, MonthKey, WeekKey};
use crate::config::AnalysisConfig;
use crate::models::{CanonicalTransaction, TimeBucket};

/// Peaks are weekdays within this many share points of the busiest day
const DOW_PEAK_TOLERANCE: f64 = 0.05;
const DOW_PEAK_MIN_SHARE: f64 = 0.2;
const CATEGORY_WINDOW_DAYS: i64 = 30;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Share of a category's spend per time-of-day bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeBucketShares {
    pub morning: f64,
    pub afternoon: f64,
    pub evening: f64,
    pub late: f64,
}

impl TimeBucketShares {
    pub fn get(&self, bucket: TimeBucket) -> f64 {
        match bucket {
            TimeBucket::Morning => self.morning,
            TimeBucket::Afternoon => self.afternoon,
            TimeBucket::Evening => self.evening,
            TimeBucket::Late => self.late,
        }
    }

    fn slot(&mut self, bucket: TimeBucket) -> &mut f64 {
        match bucket {
            TimeBucket::Morning => &mut self.morning,
            TimeBucket::Afternoon => &mut self.afternoon,
            TimeBucket::Evening => &mut self.evening,
            TimeBucket::Late => &mut self.late,
        }
    }

    /// Evening plus late
    pub fn after_hours(&self) -> f64 {
        self.evening + self.late
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantConcentration {
    pub hhi: f64,
    pub top_merchant: String,
    pub top_share: f64,
    /// Category spend inside the window
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmallLeakWeek {
    pub week: WeekKey,
    pub count: usize,
    pub avg_amount: f64,
    pub total: f64,
    /// Count grew beyond the drip rise delta versus the previous leak week
    pub rising: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowSqueeze {
    pub week: WeekKey,
    pub net: f64,
    pub following_week: WeekKey,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cashflow {
    pub weekly_net: BTreeMap<WeekKey, f64>,
    pub squeezes: Vec<CashflowSqueeze>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LateNightStats {
    pub share: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidehailUsage {
    pub month: MonthKey,
    pub trip_count: usize,
    pub spend: f64,
    pub avg_ticket: f64,
}

/// Output of the pattern miner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patterns {
    /// Category -> peak weekday names, always Monday..Sunday order (not first-seen)
    pub dow_peaks: BTreeMap<String, Vec<String>>,
    pub time_buckets: BTreeMap<String, TimeBucketShares>,
    /// Keyed by category; iteration is alphabetical, not first-seen
    pub merchant_hhi: BTreeMap<String, f64>,
    pub merchant_hhi_details: BTreeMap<String, MerchantConcentration>,
    pub small_leaks: Vec<SmallLeakWeek>,
    pub cashflow: Cashflow,
    /// Keyed by category; iteration is alphabetical, not first-seen
    pub late_night: BTreeMap<String, LateNightStats>,
    pub ridehail_usage: Option<RidehailUsage>,
    pub category_30d_spend: BTreeMap<String, f64>,
}

#[derive(Default)]
struct CategoryAccumulator {
    total: f64,
    by_weekday: [f64; 7],
    by_bucket: TimeBucketShares,
}

/// Mine behavioural patterns from spend rows (cashflow uses every row)
pub fn mine_patterns(rows: &[CanonicalTransaction], config: &AnalysisConfig) -> Patterns {
    let spend: Vec<&CanonicalTransaction> = rows.iter().filter(|r| r.is_spend).collect();
    let Some(latest) = latest_timestamp(rows) else {
        return Patterns::default();
    };
    if spend.is_empty() {
        return Patterns::default();
    }

    // Out-of-range windows cover the whole batch
    let hhi_cutoff = days_before(latest, config.thresholds.hhi_window_weeks.saturating_mul(7));
    let recent_cutoff = latest - Duration::days(CATEGORY_WINDOW_DAYS);

    let mut categories: BTreeMap<&str, CategoryAccumulator> = BTreeMap::new();
    // merchants stay in first-seen order so the top merchant tie-break is stable
    let mut merchant_window: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
    let mut category_30d_spend: BTreeMap<String, f64> = BTreeMap::new();

    for row in &spend {
        let amount = row.amount_abs;
        let acc = categories.entry(row.category.as_str()).or_default();
        acc.total += amount;
        acc.by_weekday[row.weekday.num_days_from_monday() as usize] += amount;
        *acc.by_bucket.slot(row.time_bucket) += amount;

        if hhi_cutoff.map_or(true, |cutoff| row.timestamp >= cutoff) {
            let merchants = merchant_window.entry(row.category.as_str()).or_default();
            match merchants.iter_mut().find(|(m, _)| *m == row.merchant_key) {
                Some((_, total)) => *total += amount,
                None => merchants.push((row.merchant_key.as_str(), amount)),
            }
        }
        if row.timestamp >= recent_cutoff {
            *category_30d_spend.entry(row.category.clone()).or_default() += amount;
        }
    }

    let mut patterns = Patterns {
        category_30d_spend,
        ..Patterns::default()
    };

    for (category, acc) in &categories {
        if acc.total == 0.0 {
            continue;
        }

        let peaks = weekday_peaks(&acc.by_weekday, acc.total);
        if !peaks.is_empty() {
            patterns.dow_peaks.insert(category.to_string(), peaks);
        }

        let mut shares = TimeBucketShares::default();
        for bucket in TimeBucket::ALL {
            *shares.slot(bucket) = acc.by_bucket.get(bucket) / acc.total;
        }
        patterns.time_buckets.insert(category.to_string(), shares);

        let late_share = shares.after_hours();
        if late_share != 0.0 {
            patterns.late_night.insert(
                category.to_string(),
                LateNightStats {
                    share: late_share,
                    amount: acc.by_bucket.after_hours(),
                },
            );
        }
    }

    for (category, merchants) in &merchant_window {
        if let Some(details) = merchant_concentration(merchants) {
            patterns.merchant_hhi.insert(category.to_string(), details.hhi);
            patterns
                .merchant_hhi_details
                .insert(category.to_string(), details);
        }
    }

    patterns.small_leaks = small_leaks(&spend, config);
    patterns.cashflow = cashflow(rows);
    patterns.ridehail_usage = ridehail_usage(&spend, config);

    debug!(
        categories = categories.len(),
        leak_weeks = patterns.small_leaks.len(),
        squeezes = patterns.cashflow.squeezes.len(),
        ridehail_trips = patterns.ridehail_usage.as_ref().map_or(0, |u| u.trip_count),
        "Mined spending patterns"
    );
    patterns
}

pub(crate) fn latest_timestamp(rows: &[CanonicalTransaction]) -> Option<DateTime<FixedOffset>> {
    rows.iter().map(|r| r.timestamp).max()
}

fn weekday_peaks(by_weekday: &[f64; 7], total: f64) -> Vec<String> {
    let shares: Vec<(Weekday, f64)> = WEEKDAYS
        .iter()
        .zip(by_weekday)
        .filter(|(_, amount)| **amount != 0.0)
        .map(|(day, amount)| (*day, amount / total))
        .collect();
    let max_share = shares.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);

    shares
        .into_iter()
        .filter(|(_, share)| *share >= max_share - DOW_PEAK_TOLERANCE && *share >= DOW_PEAK_MIN_SHARE)
        .map(|(day, _)| weekday_name(day).to_string())
        .collect()
}

/// Herfindahl-Hirschman index of merchant shares; `merchants` in first-seen order
fn merchant_concentration(merchants: &[(&str, f64)]) -> Option<MerchantConcentration> {
    let total: f64 = merchants.iter().map(|(_, v)| v).sum();
    if total == 0.0 {
        return None;
    }

    let shares: Vec<(&str, f64)> = merchants
        .iter()
        .filter(|(_, v)| *v != 0.0)
        .map(|(m, v)| (*m, v / total))
        .collect();
    let hhi: f64 = shares.iter().map(|(_, s)| s * s).sum();

    let mut top: Option<(&str, f64)> = None;
    for (merchant, share) in &shares {
        if top.map_or(true, |(_, best)| *share > best) {
            top = Some((*merchant, *share));
        }
    }
    let (top_merchant, top_share) = top?;

    Some(MerchantConcentration {
        hhi,
        top_merchant: top_merchant.to_string(),
        top_share,
        total,
    })
}

fn small_leaks(spend: &[&CanonicalTransaction], config: &AnalysisConfig) -> Vec<SmallLeakWeek> {
    let thresholds = &config.thresholds;
    let mut weeks: BTreeMap<WeekKey, (usize, f64)> = BTreeMap::new();
    for row in spend {
        if row.amount_abs < thresholds.small_tx_threshold
            && !config.categories.is_necessity(&row.category)
        {
            let entry = weeks.entry(row.week_key).or_default();
            entry.0 += 1;
            entry.1 += row.amount_abs;
        }
    }

    let mut leaks = Vec::new();
    let mut prev_count: Option<usize> = None;
    for (week, (count, total)) in weeks {
        let rising = match prev_count {
            Some(prev) if prev > 0 => count as f64 > prev as f64 * (1.0 + thresholds.drip_rise_min_delta),
            _ => false,
        };
        prev_count = Some(count);

        if count > thresholds.small_tx_week_limit {
            leaks.push(SmallLeakWeek {
                week,
                count,
                avg_amount: total / count as f64,
                total,
                rising,
            });
        }
    }
    leaks
}

fn cashflow(rows: &[CanonicalTransaction]) -> Cashflow {
    let mut weekly_net: BTreeMap<WeekKey, f64> = BTreeMap::new();
    for row in rows {
        *weekly_net.entry(row.week_key).or_default() += row.amount;
    }

    let ordered: Vec<(WeekKey, f64)> = weekly_net.iter().map(|(w, n)| (*w, *n)).collect();
    let squeezes = ordered
        .windows(2)
        .filter(|pair| pair[0].1 < 0.0 && pair[1].1 > 0.0)
        .map(|pair| CashflowSqueeze {
            week: pair[0].0,
            net: pair[0].1,
            following_week: pair[1].0,
        })
        .collect();

    Cashflow {
        weekly_net,
        squeezes,
    }
}

fn ridehail_usage(spend: &[&CanonicalTransaction], config: &AnalysisConfig) -> Option<RidehailUsage> {
    let trips: Vec<&&CanonicalTransaction> = spend
        .iter()
        .filter(|r| config.categories.is_ridehail(&r.category))
        .collect();
    let month = trips.iter().map(|r| r.month_key).max()?;

    let (trip_count, spend) = trips
        .iter()
        .filter(|r| r.month_key == month)
        .fold((0usize, 0.0), |(count, total), r| (count + 1, total + r.amount_abs));

    Some(RidehailUsage {
        month,
        trip_count,
        spend,
        avg_ticket: if trip_count > 0 {
            spend / trip_count as f64
        } else {
            0.0
        },
    })
}
