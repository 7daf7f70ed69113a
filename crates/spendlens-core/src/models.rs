//! Domain models for Spendlens

use chrono::{DateTime, FixedOffset, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::calendar::{MonthKey, WeekKey};

/// A transaction as supplied by the caller
///
/// Unknown fields are kept in `extra` and carried through to the canonical record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Signed amount; negative is an outflow
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawTransaction {
    /// Convenience constructor used heavily in tests and demos
    pub fn new(ts: &str, amount: f64, merchant: &str, category: &str) -> Self {
        Self {
            amount,
            currency: None,
            ts: Some(ts.to_string()),
            merchant: Some(merchant.to_string()),
            category: Some(category.to_string()),
            user_id: None,
            extra: Map::new(),
        }
    }
}

/// Accept a JSON number, a numeric string, or null (treated as zero)
fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("amount out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid amount '{}'", s))),
        other => Err(serde::de::Error::custom(format!(
            "invalid amount type: {}",
            other
        ))),
    }
}

/// User ids show up as both strings and integers in exports
fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "invalid user_id type: {}",
            other
        ))),
    }
}

/// Hour-of-day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    /// 06:00-11:59
    Morning,
    /// 12:00-17:59
    Afternoon,
    /// 18:00-22:59
    Evening,
    /// 23:00-05:59
    Late,
}

impl TimeBucket {
    pub const ALL: [TimeBucket; 4] = [
        TimeBucket::Morning,
        TimeBucket::Afternoon,
        TimeBucket::Evening,
        TimeBucket::Late,
    ];

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            18..=22 => Self::Evening,
            _ => Self::Late,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Late => "late",
        }
    }

    /// Evening and late buckets count as "late night" for ordering habits
    pub fn is_after_hours(&self) -> bool {
        matches!(self, Self::Evening | Self::Late)
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized, enriched transaction
///
/// Built once by the normalizer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalTransaction {
    /// Position in the input batch
    pub index: usize,
    pub amount: f64,
    pub amount_abs: f64,
    /// Spend magnitude capped at the category percentile (sign preserved); income untouched
    pub amount_winsorised: f64,
    pub currency: String,
    /// Timestamp as supplied
    pub ts: String,
    pub timestamp: DateTime<FixedOffset>,
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub hour: u32,
    pub week_key: WeekKey,
    pub week_start: NaiveDate,
    pub month_key: MonthKey,
    pub month_start: NaiveDate,
    pub time_bucket: TimeBucket,
    pub is_spend: bool,
    pub is_income: bool,
    pub category: String,
    /// Trimmed display form
    pub merchant: String,
    /// Lower-cased grouping key
    pub merchant_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Recurring charge classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringType {
    Subscription,
    Rent,
}

impl RecurringType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Rent => "rent",
        }
    }
}

/// A charge that repeats on a weekly, fortnightly or monthly cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringCharge {
    /// Most common display name
    pub merchant: String,
    pub merchant_key: String,
    pub category: String,
    /// One of 7, 14 or 30
    pub interval_days: u32,
    /// Median signed amount (negative)
    pub median_amount: f64,
    pub pay_day_of_month: u32,
    pub occurrences: usize,
    /// Monthly charge with no other merchant active in its category recently
    pub ghost_subscription: bool,
    #[serde(rename = "type")]
    pub kind: RecurringType,
    /// Coefficient of variation of the amounts
    pub cv: f64,
}

/// Why a transaction or week was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyReason {
    SpikeVsRolling,
    SingleDaySpike,
    PotentialDuplicate,
}

impl AnomalyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpikeVsRolling => "spike_vs_rolling",
            Self::SingleDaySpike => "single_day_spike",
            Self::PotentialDuplicate => "potential_duplicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub category: String,
    /// Week key for weekly spikes, the raw timestamp otherwise
    pub period: String,
    pub amount: f64,
    pub reason: AnomalyReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Subscription,
    Swap,
    BehaviouralNudge,
    Cashflow,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Swap => "swap",
            Self::BehaviouralNudge => "behavioural_nudge",
            Self::Cashflow => "cashflow",
        }
    }
}

/// An actionable, rule-generated saving suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    pub insight: String,
    pub evidence: Map<String, Value>,
    pub action: String,
    pub expected_saving: f64,
    /// In [0, 1]
    pub confidence: f64,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Amount,
    Count,
}

/// A gamified, time-boxed savings challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub code: String,
    pub name: String,
    pub window_days: u32,
    pub target_kind: TargetKind,
    pub target: f64,
    pub category_scope: Vec<String>,
    pub context: Map<String, Value>,
    pub reward_points: u32,
    pub expected_saving: f64,
    /// Machine-checkable success rule
    pub success_criteria: String,
}
