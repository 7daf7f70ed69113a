//! Transaction normalization
//!
//! Turns raw caller records into [`CanonicalTransaction`]s: calendar fields,
//! category aliasing, merchant keys, sign flags and per-category winsorized
//! spend amounts. Any invalid record rejects the whole batch.

use std::collections::HashMap;

use chrono::{Datelike, Timelike};
use tracing::debug;

use crate::calendar::{parse_timestamp, start_of_week, MonthKey, WeekKey};
use crate::config::{AnalysisConfig, CategoryTables};
use crate::error::ValidationError;
use crate::models::{CanonicalTransaction, RawTransaction, TimeBucket};
use crate::stats::percentile;

const DEFAULT_CATEGORY: &str = "uncategorised";
const DEFAULT_MERCHANT: &str = "unknown";

/// Normalize a batch of raw transactions
pub fn normalize(
    raw: &[RawTransaction],
    config: &AnalysisConfig,
) -> Result<Vec<CanonicalTransaction>, ValidationError> {
    let mut rows = raw
        .iter()
        .enumerate()
        .map(|(index, tx)| normalize_one(index, tx, config))
        .collect::<Result<Vec<_>, _>>()?;

    winsorise_spend(&mut rows, config.thresholds.winsorise_percentile);

    debug!(
        rows = rows.len(),
        spend = rows.iter().filter(|r| r.is_spend).count(),
        income = rows.iter().filter(|r| r.is_income).count(),
        "Normalized transactions"
    );
    Ok(rows)
}

fn normalize_one(
    index: usize,
    raw: &RawTransaction,
    config: &AnalysisConfig,
) -> Result<CanonicalTransaction, ValidationError> {
    let currency = raw
        .currency
        .clone()
        .unwrap_or_else(|| config.display_currency.clone());
    if currency != config.display_currency {
        return Err(ValidationError::UnsupportedCurrency {
            index,
            found: currency,
            expected: config.display_currency.clone(),
        });
    }

    let ts = match raw.ts.as_deref() {
        Some(ts) if !ts.is_empty() => ts,
        _ => return Err(ValidationError::MissingTimestamp { index }),
    };
    let timestamp = parse_timestamp(ts).ok_or_else(|| ValidationError::InvalidTimestamp {
        index,
        value: ts.to_string(),
    })?;
    if !raw.amount.is_finite() {
        return Err(ValidationError::MalformedRecord {
            index,
            reason: format!("amount is not a finite number: {}", raw.amount),
        });
    }

    let date = timestamp.date_naive();
    let hour = timestamp.hour();
    let month_key = MonthKey::from_date(date);
    let merchant = raw
        .merchant
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MERCHANT)
        .trim()
        .to_string();

    Ok(CanonicalTransaction {
        index,
        amount: raw.amount,
        amount_abs: raw.amount.abs(),
        amount_winsorised: raw.amount,
        currency,
        ts: ts.to_string(),
        timestamp,
        date,
        weekday: date.weekday(),
        hour,
        week_key: WeekKey::from_date(date),
        week_start: start_of_week(date),
        month_key,
        month_start: month_key.start(),
        time_bucket: TimeBucket::from_hour(hour),
        is_spend: raw.amount < 0.0,
        is_income: raw.amount > 0.0,
        category: normalize_category(raw.category.as_deref(), &config.categories),
        merchant_key: merchant.to_lowercase(),
        merchant,
        user_id: raw.user_id.clone(),
        extra: raw.extra.clone(),
    })
}

/// Case-fold a raw category and map it through the alias table
pub fn normalize_category(raw: Option<&str>, tables: &CategoryTables) -> String {
    let folded = raw
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .trim()
        .to_lowercase();

    if let Some(alias) = tables.aliases.get(&folded) {
        return alias.clone();
    }
    if folded.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        folded
    }
}

/// Cap each spend magnitude at its category's percentile over the whole batch
fn winsorise_spend(rows: &mut [CanonicalTransaction], q: f64) {
    let mut per_category: HashMap<&str, Vec<f64>> = HashMap::new();
    for row in rows.iter().filter(|r| r.is_spend) {
        per_category
            .entry(row.category.as_str())
            .or_default()
            .push(row.amount_abs);
    }
    let caps: HashMap<String, f64> = per_category
        .into_iter()
        .map(|(category, values)| (category.to_string(), percentile(&values, q)))
        .collect();

    for row in rows.iter_mut().filter(|r| r.is_spend) {
        let cap = caps.get(&row.category).copied().unwrap_or(row.amount_abs);
        row.amount_winsorised = -row.amount_abs.min(cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_enriches_calendar_fields() {
        let raw = vec![RawTransaction::new("2024-12-30T23:15:00Z", -4.5, "  Pret ", "Pret")];
        let rows = normalize(&raw, &config()).unwrap();
        let row = &rows[0];

        assert_eq!(row.week_key.to_string(), "2025-W01");
        assert_eq!(row.month_key.to_string(), "2024-12");
        assert_eq!(row.weekday, Weekday::Mon);
        assert_eq!(row.hour, 23);
        assert_eq!(row.time_bucket, TimeBucket::Late);
        assert_eq!(row.week_start.to_string(), "2024-12-30");
        assert_eq!(row.month_start.to_string(), "2024-12-01");
        assert_eq!(row.merchant, "Pret");
        assert_eq!(row.merchant_key, "pret");
        assert_eq!(row.category, "dining.coffee");
        assert!(row.is_spend);
        assert!(!row.is_income);
        assert_eq!(row.currency, "GBP");
    }

    #[test]
    fn test_category_defaults_and_aliases() {
        let tables = CategoryTables::default();
        assert_eq!(normalize_category(Some("UBER"), &tables), "transport.ridehail");
        assert_eq!(normalize_category(Some(" Groceries "), &tables), "groceries");
        assert_eq!(normalize_category(None, &tables), "uncategorised");
        assert_eq!(normalize_category(Some(""), &tables), "uncategorised");
        assert_eq!(normalize_category(Some("   "), &tables), "uncategorised");
        assert_eq!(normalize_category(Some("Pets"), &tables), "pets");
    }

    #[test]
    fn test_missing_merchant_is_unknown() {
        let mut raw = RawTransaction::new("2024-01-01T10:00:00Z", -1.0, "", "misc");
        raw.merchant = None;
        let rows = normalize(&[raw], &config()).unwrap();
        assert_eq!(rows[0].merchant, "unknown");
    }

    #[test]
    fn test_rejects_currency_mismatch() {
        let mut raw = RawTransaction::new("2024-01-01T10:00:00Z", -10.0, "Shop", "misc");
        raw.currency = Some("USD".to_string());
        let ok = RawTransaction::new("2024-01-02T10:00:00Z", -10.0, "Shop", "misc");

        let err = normalize(&[ok, raw], &config()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedCurrency {
                index: 1,
                found: "USD".to_string(),
                expected: "GBP".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_missing_and_invalid_timestamp() {
        let mut raw = RawTransaction::new("", -10.0, "Shop", "misc");
        assert_eq!(
            normalize(&[raw.clone()], &config()).unwrap_err(),
            ValidationError::MissingTimestamp { index: 0 }
        );

        raw.ts = Some("not a date".to_string());
        assert!(matches!(
            normalize(&[raw], &config()).unwrap_err(),
            ValidationError::InvalidTimestamp { index: 0, .. }
        ));
    }

    #[test]
    fn test_winsorisation_caps_spend_only() {
        let mut raw: Vec<RawTransaction> = (1..=99)
            .map(|i| RawTransaction::new("2024-03-01T12:00:00Z", -(i as f64), "Shop", "misc"))
            .collect();
        raw.push(RawTransaction::new("2024-03-01T12:00:00Z", -10_000.0, "Shop", "misc"));
        raw.push(RawTransaction::new("2024-03-01T12:00:00Z", 50_000.0, "Employer", "salary"));

        let rows = normalize(&raw, &config()).unwrap();
        let sorted: Vec<f64> = {
            let mut v: Vec<f64> = rows.iter().filter(|r| r.is_spend).map(|r| r.amount_abs).collect();
            v.sort_by(f64::total_cmp);
            v
        };
        let cap = percentile(&sorted, 0.99);

        for row in rows.iter().filter(|r| r.is_spend) {
            assert!(row.amount_winsorised < 0.0);
            assert!(row.amount_winsorised.abs() <= row.amount_abs);
            assert!(row.amount_winsorised.abs() <= cap + 1e-9);
        }
        let outlier = rows.iter().find(|r| r.amount == -10_000.0).unwrap();
        assert!(outlier.amount_winsorised.abs() < 10_000.0);

        let income = rows.iter().find(|r| r.is_income).unwrap();
        assert_eq!(income.amount_winsorised, 50_000.0);
        assert_eq!(income.category, "income.salary");
    }

    #[test]
    fn test_empty_batch() {
        assert!(normalize(&[], &config()).unwrap().is_empty());
    }
}
