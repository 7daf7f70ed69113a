//! Trends command implementation

use std::path::Path;

use anyhow::Result;
use spendlens_core::suggestions::format_currency;
use spendlens_core::{Analyzer, Trends};

use super::{format_pct, load_batch, load_config};

pub fn cmd_trends(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let transactions = load_batch(file)?;
    let analyzer = Analyzer::with_config(config);
    let analysis = analyzer.run(&transactions)?;

    print!(
        "{}",
        render_trends(&analysis.trends, analyzer.config().currency_symbol())
    );
    Ok(())
}

/// Monthly table plus forecast line
pub fn render_trends(trends: &Trends, symbol: &str) -> String {
    let money = |v: f64| format_currency(v, symbol);
    let mut out = vec![String::new(), "📈 Monthly Trends".to_string()];

    if trends.monthly_spend.is_empty() {
        out.push("   No transactions.".to_string());
        out.push(String::new());
        return out.join("\n");
    }

    out.push(format!(
        "   {:<9} {:>12} {:>9} {:>12} {:>12}",
        "MONTH", "SPEND", "MOM", "3M AVG", "INCOME"
    ));
    out.push(format!("   {}", "─".repeat(58)));

    for (idx, (month, spend)) in trends.monthly_spend.iter().enumerate() {
        let mom = trends
            .spend_mom_pct
            .get(idx)
            .copied()
            .flatten()
            .map(format_pct)
            .unwrap_or_else(|| "-".to_string());
        let average = trends
            .spend_moving_average
            .get(idx)
            .copied()
            .flatten()
            .map(money)
            .unwrap_or_else(|| "-".to_string());
        let income = trends.monthly_income.get(month).unwrap_or(0.0);
        out.push(format!(
            "   {:<9} {:>12} {:>9} {:>12} {:>12}",
            month.to_string(),
            money(spend),
            mom,
            average,
            money(income)
        ));
    }

    out.push(String::new());
    out.push(format!(
        "   Spend slope: {} / month",
        money(trends.trend_slopes.total_spend)
    ));
    match &trends.forecast {
        Some(forecast) => {
            let backstop = forecast
                .backstop_value
                .map(|v| format!(" ({} {})", forecast.backstop_model.as_str(), money(v)))
                .unwrap_or_default();
            out.push(format!(
                "   Forecast {}: {} via {}{}",
                forecast.month,
                money(forecast.primary_value),
                forecast.primary_model.as_str(),
                backstop
            ));
        }
        None => out.push("   Forecast: not enough history".to_string()),
    }
    out.push(String::new());
    out.join("\n")
}
