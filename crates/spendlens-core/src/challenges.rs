//! Gamified savings challenges derived from suggestions, patterns and variances

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::models::{Challenge, Suggestion, SuggestionType, TargetKind};
use crate::patterns::Patterns;
use crate::stats::round_to_nearest_5;
use crate::variance::Variances;

const GROCERIES: &str = "groceries";
const EATING_OUT: &str = "eating_out";
const RIDEHAIL: &str = "transport.ridehail";

/// Fraction of a month covered by a two-week challenge
const FORTNIGHT_FRACTION: f64 = 14.0 / 30.0;
const RIDEHAIL_SWAP_TRIPS: usize = 4;

/// Build up to `max_challenges` challenges, largest expected saving first
pub fn build_challenges(
    suggestions: &[Suggestion],
    patterns: &Patterns,
    variances: &Variances,
    config: &AnalysisConfig,
) -> Vec<Challenge> {
    let mut candidates: Vec<Challenge> = [
        grocery_trim(variances),
        no_late_night(patterns, config),
        ridehail_swap(patterns),
        subscription_audit(suggestions),
    ]
    .into_iter()
    .flatten()
    .collect();

    candidates.sort_by(|a, b| b.expected_saving.total_cmp(&a.expected_saving));
    candidates.truncate(config.thresholds.max_challenges);
    debug!(challenges = candidates.len(), "Built challenges");
    candidates
}

fn grocery_trim(variances: &Variances) -> Option<Challenge> {
    let baseline = variances
        .per_category
        .get(GROCERIES)
        .map(|v| v.baseline)
        .filter(|b| *b > 0.0)?;

    Some(Challenge {
        code: "GROCERY_TRIM_14D".to_string(),
        name: "Trim Groceries by 10%".to_string(),
        window_days: 14,
        target_kind: TargetKind::Amount,
        target: round_to_nearest_5(baseline * 0.9 * FORTNIGHT_FRACTION),
        category_scope: vec![GROCERIES.to_string()],
        context: Map::new(),
        reward_points: 120,
        expected_saving: baseline * 0.1 * FORTNIGHT_FRACTION,
        success_criteria: "spend(groceries,14d) <= 0.9 * baseline".to_string(),
    })
}

fn no_late_night(patterns: &Patterns, config: &AnalysisConfig) -> Option<Challenge> {
    let stats = patterns.late_night.get(EATING_OUT)?;
    let after_hour = config.thresholds.late_hours_start;

    Some(Challenge {
        code: "NO_LATE_NIGHT_7D".to_string(),
        name: "No Late-Night Orders".to_string(),
        window_days: 7,
        target_kind: TargetKind::Amount,
        target: 0.0,
        category_scope: vec![EATING_OUT.to_string()],
        context: context(json!({ "after_hour": after_hour })),
        reward_points: 100,
        expected_saving: stats.amount / 4.0,
        success_criteria: format!(
            "sum(amount where cat=eating_out and hour>={}) == 0",
            after_hour
        ),
    })
}

fn ridehail_swap(patterns: &Patterns) -> Option<Challenge> {
    let usage = patterns
        .ridehail_usage
        .as_ref()
        .filter(|u| u.trip_count >= RIDEHAIL_SWAP_TRIPS)?;

    Some(Challenge {
        code: "RIDEHAIL_SWAP_14D".to_string(),
        name: "Swap 4 Ride-Hail Trips".to_string(),
        window_days: 14,
        target_kind: TargetKind::Count,
        target: usage.trip_count.saturating_sub(RIDEHAIL_SWAP_TRIPS) as f64,
        category_scope: vec![RIDEHAIL.to_string()],
        context: context(json!({ "replace_with": "walk/bus" })),
        reward_points: 90,
        expected_saving: usage.spend * 0.4,
        success_criteria: "replace >=4 trips with non-ridehail options".to_string(),
    })
}

fn subscription_audit(suggestions: &[Suggestion]) -> Option<Challenge> {
    let subscription = suggestions
        .iter()
        .find(|s| s.kind == SuggestionType::Subscription)?;

    Some(Challenge {
        code: "SUBSCRIPTION_AUDIT_30D".to_string(),
        name: "Cancel One Subscription".to_string(),
        window_days: 30,
        target_kind: TargetKind::Count,
        target: 1.0,
        category_scope: vec![subscription.category.clone()],
        context: Map::new(),
        reward_points: 80,
        expected_saving: subscription.expected_saving,
        success_criteria: "cancel_or_downgrade >=1 recurring charge".to_string(),
    })
}

fn context(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
