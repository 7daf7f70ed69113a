//! Rule-based savings suggestions
//!
//! Generators run in a fixed order and their output is concatenated, then
//! capped. Order matters: the subscription audit challenge picks the first
//! subscription suggestion.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::models::{RecurringCharge, RecurringType, Suggestion, SuggestionType};
use crate::patterns::Patterns;

const MONTHLY_INTERVAL: u32 = 30;
const SWAP_SAVING_RATE: f64 = 0.1;
const WEEKS_PER_MONTH: f64 = 4.0;
const LATE_NIGHT_MIN_SHARE: f64 = 0.35;
const LATE_NIGHT_CUT: f64 = 0.3;
const LATE_NIGHT_PROJECTION_FACTOR: f64 = 1.33;
const RIDEHAIL_MIN_TRIPS: usize = 4;
const RIDEHAIL_SWAP_SHARE: f64 = 0.5;

/// Build the ranked suggestion list (capped at `max_suggestions`)
///
/// Per-category generators walk categories alphabetically, not in first-seen order.
pub fn build_suggestions(
    patterns: &Patterns,
    recurring: &[RecurringCharge],
    config: &AnalysisConfig,
) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    suggestions.extend(subscription_suggestions(recurring, config));
    suggestions.extend(merchant_swap_suggestions(patterns, config));
    suggestions.extend(drip_spend_suggestion(patterns, config));
    suggestions.extend(late_night_suggestions(patterns, config));
    suggestions.extend(ridehail_suggestion(patterns, config));
    suggestions.extend(cashflow_buffer_suggestion(patterns, recurring, config));

    let generated = suggestions.len();
    suggestions.truncate(config.thresholds.max_suggestions);
    debug!(generated, kept = suggestions.len(), "Built suggestions");
    suggestions
}

fn subscription_suggestions(recurring: &[RecurringCharge], config: &AnalysisConfig) -> Vec<Suggestion> {
    recurring
        .iter()
        .filter(|r| r.kind == RecurringType::Subscription || r.ghost_subscription)
        .filter(|r| r.interval_days == MONTHLY_INTERVAL)
        .map(|r| {
            let amount = r.median_amount.abs();
            let mut insight = format!(
                "{} charges {} every {}d",
                r.merchant,
                format_currency(amount, config.currency_symbol()),
                r.interval_days
            );
            if r.ghost_subscription {
                insight.push_str(" and shows low surrounding activity");
            }
            Suggestion {
                title: format!("Review {} subscription", r.merchant),
                insight,
                evidence: evidence(json!({
                    "interval_days": r.interval_days,
                    "median_amount": r.median_amount,
                    "pay_day": r.pay_day_of_month,
                    "ghost": r.ghost_subscription,
                })),
                action: "Cancel or downgrade the plan if it's unused.".to_string(),
                expected_saving: amount,
                confidence: 0.75,
                category: r.category.clone(),
                kind: SuggestionType::Subscription,
            }
        })
        .collect()
}

fn merchant_swap_suggestions(patterns: &Patterns, config: &AnalysisConfig) -> Vec<Suggestion> {
    patterns
        .merchant_hhi_details
        .iter()
        .filter(|(category, _)| config.categories.swap_eligible.contains(*category))
        .filter(|(_, info)| info.hhi > config.thresholds.hhi_high_threshold)
        .map(|(category, info)| {
            let label = humanise_category(category);
            Suggestion {
                title: format!("Swap out pricey {} merchants", label),
                insight: format!(
                    "{} spend is {:.2} HHI; {} accounts for {:.0}%",
                    label,
                    info.hhi,
                    title_case(&info.top_merchant),
                    info.top_share * 100.0
                ),
                evidence: evidence(json!({
                    "top_merchant": info.top_merchant,
                    "top_share": info.top_share,
                    "hhi": info.hhi,
                })),
                action: "Shift at least half of orders to a lower-cost alternative or loyalty offer."
                    .to_string(),
                expected_saving: info.total * SWAP_SAVING_RATE * info.top_share,
                confidence: 0.6,
                category: category.clone(),
                kind: SuggestionType::Swap,
            }
        })
        .collect()
}

fn drip_spend_suggestion(patterns: &Patterns, config: &AnalysisConfig) -> Option<Suggestion> {
    let latest = patterns.small_leaks.last()?;
    let symbol = config.currency_symbol();
    let excess = latest
        .count
        .saturating_sub(config.thresholds.small_tx_week_limit);

    Some(Suggestion {
        title: format!(
            "Cap sub-{}{} drip spend",
            symbol,
            format_threshold(config.thresholds.small_tx_threshold)
        ),
        insight: format!(
            "{} small transactions last week (avg {}).",
            latest.count,
            format_currency(latest.avg_amount, symbol)
        ),
        evidence: evidence(json!({
            "week": latest.week.to_string(),
            "count": latest.count,
            "avg_small_tx": latest.avg_amount,
        })),
        action: "Limit small discretionary taps to 3 per week and batch essentials.".to_string(),
        expected_saving: excess as f64 * latest.avg_amount * WEEKS_PER_MONTH,
        confidence: 0.55,
        category: "misc".to_string(),
        kind: SuggestionType::BehaviouralNudge,
    })
}

fn late_night_suggestions(patterns: &Patterns, config: &AnalysisConfig) -> Vec<Suggestion> {
    patterns
        .late_night
        .iter()
        .filter(|(category, _)| config.categories.late_night.contains(*category))
        .filter(|(_, stats)| stats.share >= LATE_NIGHT_MIN_SHARE)
        .map(|(category, stats)| {
            let label = humanise_category(category);
            let last_30d = patterns
                .category_30d_spend
                .get(category)
                .copied()
                .unwrap_or(0.0);
            Suggestion {
                title: format!("Cut late-night {} by 30%", label),
                insight: format!("{} is {:.0}% after 18:00.", label, stats.share * 100.0),
                evidence: evidence(json!({
                    "time_peak": "evening+late",
                    "last_30d_spend": last_30d,
                    "projection": last_30d * LATE_NIGHT_PROJECTION_FACTOR,
                })),
                action: format!(
                    "Pre-plan meals and limit post-{}:00 orders to 1 night/week.",
                    config.thresholds.late_hours_start
                ),
                expected_saving: stats.amount * LATE_NIGHT_CUT,
                confidence: 0.6,
                category: category.clone(),
                kind: SuggestionType::BehaviouralNudge,
            }
        })
        .collect()
}

fn ridehail_suggestion(patterns: &Patterns, config: &AnalysisConfig) -> Option<Suggestion> {
    let usage = patterns
        .ridehail_usage
        .as_ref()
        .filter(|u| u.trip_count > RIDEHAIL_MIN_TRIPS)?;

    Some(Suggestion {
        title: "Swap half of ride-hail trips to bus/walk".to_string(),
        insight: format!(
            "{} ride-hail trips this month averaging {}.",
            usage.trip_count,
            format_currency(usage.avg_ticket, config.currency_symbol())
        ),
        evidence: evidence(json!({
            "month": usage.month.to_string(),
            "trip_count": usage.trip_count,
            "avg_ticket": usage.avg_ticket,
        })),
        action: "Plan errands to bundle journeys and default to transit when weather allows."
            .to_string(),
        expected_saving: usage.spend * RIDEHAIL_SWAP_SHARE,
        confidence: 0.5,
        category: "transport.ridehail".to_string(),
        kind: SuggestionType::BehaviouralNudge,
    })
}

fn cashflow_buffer_suggestion(
    patterns: &Patterns,
    recurring: &[RecurringCharge],
    config: &AnalysisConfig,
) -> Option<Suggestion> {
    let squeeze = patterns.cashflow.squeezes.last()?;
    let rent = recurring.iter().find(|r| r.kind == RecurringType::Rent)?;
    let weekly = rent.median_amount.abs() / WEEKS_PER_MONTH;

    Some(Suggestion {
        title: "Build a rent buffer".to_string(),
        insight: "Recent negative cashflow weeks flip positive right after rent.".to_string(),
        evidence: evidence(json!({
            "rent_due_day": rent.pay_day_of_month,
            "squeeze_week": squeeze.week.to_string(),
            "net": squeeze.net,
        })),
        action: format!(
            "Auto-set aside {} weekly before rent hits.",
            format_currency(weekly, config.currency_symbol())
        ),
        // smooths cashflow rather than cutting cost
        expected_saving: 0.0,
        confidence: 0.65,
        category: "housing.rent".to_string(),
        kind: SuggestionType::Cashflow,
    })
}

fn evidence(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `1234.5` -> `£1,234.50`, negative values keep a leading minus
pub fn format_currency(value: f64, symbol: &str) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}{}{}.{}", sign, symbol, grouped, cents)
}

fn format_threshold(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// `dining.coffee` -> `Dining Coffee`
pub fn humanise_category(category: &str) -> String {
    title_case(&category.replace(['.', '_'], " "))
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
