//! Monthly spend/income trends and next-month forecast

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::MonthKey;
use crate::models::CanonicalTransaction;
use crate::stats::{linear_trend, pct_change, rolling_mean};

const MOVING_AVERAGE_WINDOW: usize = 3;
const SEASONAL_LAG_MONTHS: i32 = 12;

/// Parallel month keys and values, months in chronological order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlySeries {
    pub months: Vec<MonthKey>,
    pub values: Vec<f64>,
}

impl MonthlySeries {
    /// Align a sparse month map onto `months`, filling gaps with zero
    fn aligned(months: &[MonthKey], totals: &BTreeMap<MonthKey, f64>) -> Self {
        Self {
            months: months.to_vec(),
            values: months
                .iter()
                .map(|m| totals.get(m).copied().unwrap_or(0.0))
                .collect(),
        }
    }

    pub fn get(&self, month: MonthKey) -> Option<f64> {
        self.months
            .iter()
            .position(|m| *m == month)
            .map(|idx| self.values[idx])
    }

    pub fn last(&self) -> Option<(MonthKey, f64)> {
        self.months.last().copied().zip(self.values.last().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (MonthKey, f64)> + '_ {
        self.months.iter().copied().zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    /// Month-over-month change per point; the first point is always undefined
    pub fn month_over_month(&self) -> Vec<Option<f64>> {
        self.values
            .iter()
            .enumerate()
            .map(|(idx, curr)| {
                if idx == 0 {
                    None
                } else {
                    pct_change(*curr, self.values[idx - 1])
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    SeasonalNaive,
    MovingAverage,
}

impl ForecastModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeasonalNaive => "seasonal_naive",
            Self::MovingAverage => "moving_average",
        }
    }

    fn other(&self) -> Self {
        match self {
            Self::SeasonalNaive => Self::MovingAverage,
            Self::MovingAverage => Self::SeasonalNaive,
        }
    }
}

/// Spend forecast for the month after the last observed one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub month: MonthKey,
    pub primary_model: ForecastModel,
    pub primary_value: f64,
    pub backstop_model: ForecastModel,
    pub backstop_value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSlopes {
    pub total_spend: f64,
    pub total_income: f64,
    pub categories: BTreeMap<String, f64>,
}

/// Output of the trend engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trends {
    pub monthly_spend: MonthlySeries,
    pub monthly_income: MonthlySeries,
    pub spend_moving_average: Vec<Option<f64>>,
    pub income_moving_average: Vec<Option<f64>>,
    pub spend_mom_pct: Vec<Option<f64>>,
    pub income_mom_pct: Vec<Option<f64>>,
    /// Per-category spend aligned to `monthly_spend.months`
    pub category_spend: BTreeMap<String, MonthlySeries>,
    /// Month -> category -> share of that month's spend (non-zero entries only)
    pub category_share: BTreeMap<MonthKey, BTreeMap<String, f64>>,
    pub trend_slopes: TrendSlopes,
    pub forecast: Option<Forecast>,
}

/// Aggregate monthly series, slopes and forecast
pub fn compute_trends(rows: &[CanonicalTransaction]) -> Trends {
    let mut spend_totals: BTreeMap<MonthKey, f64> = BTreeMap::new();
    let mut income_totals: BTreeMap<MonthKey, f64> = BTreeMap::new();
    let mut category_totals: BTreeMap<String, BTreeMap<MonthKey, f64>> = BTreeMap::new();

    for row in rows {
        if row.is_spend {
            let amount = row.amount_winsorised.abs();
            *spend_totals.entry(row.month_key).or_default() += amount;
            *category_totals
                .entry(row.category.clone())
                .or_default()
                .entry(row.month_key)
                .or_default() += amount;
        } else if row.is_income {
            *income_totals.entry(row.month_key).or_default() += row.amount;
        }
    }

    let months: Vec<MonthKey> = spend_totals
        .keys()
        .chain(income_totals.keys())
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let monthly_spend = MonthlySeries::aligned(&months, &spend_totals);
    let monthly_income = MonthlySeries::aligned(&months, &income_totals);
    let category_spend: BTreeMap<String, MonthlySeries> = category_totals
        .iter()
        .map(|(category, totals)| (category.clone(), MonthlySeries::aligned(&months, totals)))
        .collect();

    let category_share = category_shares(&monthly_spend, &category_spend);
    let trend_slopes = TrendSlopes {
        total_spend: linear_trend(&monthly_spend.values),
        total_income: linear_trend(&monthly_income.values),
        categories: category_spend
            .iter()
            .map(|(category, series)| (category.clone(), linear_trend(&series.values)))
            .collect(),
    };
    let forecast = forecast_next_month(&monthly_spend);

    debug!(
        months = months.len(),
        categories = category_spend.len(),
        forecast = ?forecast.as_ref().map(|f| f.primary_value),
        "Computed monthly trends"
    );

    Trends {
        spend_moving_average: rolling_mean(&monthly_spend.values, MOVING_AVERAGE_WINDOW),
        income_moving_average: rolling_mean(&monthly_income.values, MOVING_AVERAGE_WINDOW),
        spend_mom_pct: monthly_spend.month_over_month(),
        income_mom_pct: monthly_income.month_over_month(),
        monthly_spend,
        monthly_income,
        category_spend,
        category_share,
        trend_slopes,
        forecast,
    }
}

fn category_shares(
    total: &MonthlySeries,
    categories: &BTreeMap<String, MonthlySeries>,
) -> BTreeMap<MonthKey, BTreeMap<String, f64>> {
    let mut shares = BTreeMap::new();
    for (idx, (month, month_total)) in total.iter().enumerate() {
        if month_total == 0.0 {
            continue;
        }
        let month_shares: BTreeMap<String, f64> = categories
            .iter()
            .filter(|(_, series)| series.values[idx] != 0.0)
            .map(|(category, series)| (category.clone(), series.values[idx] / month_total))
            .collect();
        if !month_shares.is_empty() {
            shares.insert(month, month_shares);
        }
    }
    shares
}

/// Seasonal-naive (same month last year) when available, else 3-month moving average
pub fn forecast_next_month(spend: &MonthlySeries) -> Option<Forecast> {
    let (last_month, _) = spend.last()?;
    let month = last_month.add_months(1);

    let seasonal = spend.get(month.add_months(-SEASONAL_LAG_MONTHS));
    let moving_average = (spend.len() >= MOVING_AVERAGE_WINDOW).then(|| {
        spend.values[spend.len() - MOVING_AVERAGE_WINDOW..]
            .iter()
            .sum::<f64>()
            / MOVING_AVERAGE_WINDOW as f64
    });

    let (primary_model, primary_value, backstop_value) = match (seasonal, moving_average) {
        (Some(value), backstop) => (ForecastModel::SeasonalNaive, value, backstop),
        (None, Some(value)) => (ForecastModel::MovingAverage, value, None),
        (None, None) => return None,
    };

    Some(Forecast {
        month,
        primary_model,
        primary_value,
        backstop_model: primary_model.other(),
        backstop_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::models::RawTransaction;
    use crate::normalize::normalize;

    fn rows(raw: &[(&str, f64, &str)]) -> Vec<CanonicalTransaction> {
        let raw: Vec<RawTransaction> = raw
            .iter()
            .map(|(ts, amount, category)| RawTransaction::new(ts, *amount, "Shop", category))
            .collect();
        normalize(&raw, &AnalysisConfig::default()).unwrap()
    }

    fn month(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_months_are_chronological_across_years() {
        let trends = compute_trends(&rows(&[
            ("2025-01-10T10:00:00Z", -30.0, "groceries"),
            ("2024-11-10T10:00:00Z", -10.0, "eating_out"),
            ("2024-12-10T10:00:00Z", 100.0, "salary"),
        ]));

        let months: Vec<String> = trends.monthly_spend.months.iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["2024-11", "2024-12", "2025-01"]);
        assert_eq!(trends.monthly_spend.values, vec![10.0, 0.0, 30.0]);
        assert_eq!(trends.monthly_income.values, vec![0.0, 100.0, 0.0]);
        assert_eq!(trends.category_spend["groceries"].values, vec![0.0, 0.0, 30.0]);
    }

    #[test]
    fn test_month_over_month_nulls() {
        let trends = compute_trends(&rows(&[
            ("2024-01-10T10:00:00Z", -100.0, "books"),
            ("2024-02-10T10:00:00Z", 50.0, "salary"),
            ("2024-03-10T10:00:00Z", -80.0, "games"),
            ("2024-04-10T10:00:00Z", -120.0, "music"),
        ]));

        assert_eq!(trends.monthly_spend.values, vec![100.0, 0.0, 80.0, 120.0]);
        // first month undefined, Feb is -100%, Mar follows a zero month
        assert_eq!(trends.spend_mom_pct, vec![None, Some(-1.0), None, Some(0.5)]);
        assert_eq!(
            trends.spend_moving_average,
            vec![None, None, Some(60.0), Some(200.0 / 3.0)]
        );
    }

    #[test]
    fn test_category_share_skips_zero_months() {
        let trends = compute_trends(&rows(&[
            ("2024-01-10T10:00:00Z", -75.0, "groceries"),
            ("2024-01-11T10:00:00Z", -25.0, "eating_out"),
            ("2024-02-10T10:00:00Z", 500.0, "salary"),
        ]));

        let jan = &trends.category_share[&month("2024-01")];
        assert_eq!(jan["groceries"], 0.75);
        assert_eq!(jan["eating_out"], 0.25);
        assert!(!trends.category_share.contains_key(&month("2024-02")));
    }

    #[test]
    fn test_slopes() {
        let trends = compute_trends(&rows(&[
            ("2024-01-10T10:00:00Z", -10.0, "misc"),
            ("2024-02-10T10:00:00Z", -30.0, "misc"),
            ("2024-03-10T10:00:00Z", -30.0, "misc"),
        ]));
        // [10, 30, 30]: the repeated maximum keeps the percentile cap at 30
        assert!((trends.trend_slopes.total_spend - 10.0).abs() < 1e-9);
        assert!((trends.trend_slopes.categories["misc"] - 10.0).abs() < 1e-9);
        assert_eq!(trends.trend_slopes.total_income, 0.0);
    }

    #[test]
    fn test_forecast_moving_average() {
        let series = MonthlySeries {
            months: vec![month("2024-01"), month("2024-02"), month("2024-03")],
            values: vec![90.0, 120.0, 150.0],
        };
        let forecast = forecast_next_month(&series).unwrap();
        assert_eq!(forecast.month, month("2024-04"));
        assert_eq!(forecast.primary_model, ForecastModel::MovingAverage);
        assert_eq!(forecast.primary_value, 120.0);
        assert_eq!(forecast.backstop_model, ForecastModel::SeasonalNaive);
        assert_eq!(forecast.backstop_value, None);
    }

    #[test]
    fn test_forecast_prefers_seasonal() {
        let months: Vec<MonthKey> = (0..12).map(|i| month("2023-05").add_months(i)).collect();
        let values: Vec<f64> = (0..12).map(|i| 100.0 + i as f64).collect();
        let series = MonthlySeries { months, values };

        let forecast = forecast_next_month(&series).unwrap();
        assert_eq!(forecast.month, month("2024-05"));
        assert_eq!(forecast.primary_model, ForecastModel::SeasonalNaive);
        assert_eq!(forecast.primary_value, 100.0);
        assert_eq!(forecast.backstop_value, Some(110.0));
    }

    #[test]
    fn test_forecast_absent_with_short_history() {
        let series = MonthlySeries {
            months: vec![month("2024-01"), month("2024-02")],
            values: vec![1.0, 2.0],
        };
        assert!(forecast_next_month(&series).is_none());
        assert!(forecast_next_month(&MonthlySeries::default()).is_none());
    }

    #[test]
    fn test_empty_input() {
        let trends = compute_trends(&[]);
        assert!(trends.monthly_spend.is_empty());
        assert!(trends.category_spend.is_empty());
        assert!(trends.forecast.is_none());
        assert_eq!(trends.trend_slopes.total_spend, 0.0);
    }
}
