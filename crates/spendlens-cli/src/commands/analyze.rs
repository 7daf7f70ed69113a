//! Analyze command implementation

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use spendlens_core::suggestions::{format_currency, humanise_category};
use spendlens_core::{Analyzer, Report};

use super::{format_pct, load_batch, load_config, truncate};
use crate::cli::OutputFormat;

const RULE: &str = "   ─────────────────────────────────────────────────────────────";

pub fn cmd_analyze(
    config_path: Option<&Path>,
    file: &Path,
    format: OutputFormat,
    baselines: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let transactions = load_batch(file)?;

    let mut analyzer = Analyzer::with_config(config);
    if let Some(path) = baselines {
        analyzer = analyzer.with_baselines(load_baselines(path)?);
    }
    let report = analyzer.analyse(&transactions)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            print!("{}", render_report(&report, analyzer.config().currency_symbol()))
        }
    }
    Ok(())
}

/// Read a `{"category": amount}` baselines file
pub fn load_baselines(path: &Path) -> Result<BTreeMap<String, f64>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read baselines {}", path.display()))?;
    serde_json::from_str(&content).context("Baselines must be a JSON object of category to amount")
}

/// Human-readable report
pub fn render_report(report: &Report, symbol: &str) -> String {
    let money = |v: f64| format_currency(v, symbol);
    let summary = &report.summary;
    let mut out = vec![
        String::new(),
        "📊 Spending Report".to_string(),
        format!(
            "   Period: {}",
            if summary.period.is_empty() {
                "(no transactions)"
            } else {
                summary.period.as_str()
            }
        ),
        RULE.to_string(),
        format!("   Spend, last 30 days:   {:>12}", money(summary.total_spend_30d)),
        format!(
            "   Projected this month:  {:>12}",
            money(summary.projected_spend_curr_month)
        ),
    ];

    if !summary.top_rising_categories.is_empty() {
        out.push(String::new());
        out.push("📈 Rising categories".to_string());
        for rising in &summary.top_rising_categories {
            out.push(format!(
                "   {:<28} {:>10}",
                humanise_category(&rising.category),
                format_pct(rising.mom_pct)
            ));
        }
    }

    if !summary.top_saving_opportunities.is_empty() {
        out.push(String::new());
        out.push("💰 Saving opportunities".to_string());
        for opportunity in &summary.top_saving_opportunities {
            out.push(format!(
                "   {:<28} {:>10}",
                humanise_category(&opportunity.category),
                money(opportunity.amount)
            ));
        }
    }

    if !report.recurring.is_empty() {
        out.push(String::new());
        out.push(format!("🔁 Recurring charges ({})", report.recurring.len()));
        for charge in &report.recurring {
            out.push(format!(
                "   {:<28} {:>10} every {}d ({}, day {}){}",
                truncate(&charge.merchant, 28),
                money(charge.median_amount.abs()),
                charge.interval_days,
                charge.kind.as_str(),
                charge.pay_day_of_month,
                if charge.ghost_subscription { " 👻" } else { "" }
            ));
        }
    }

    if !report.anomalies.is_empty() {
        out.push(String::new());
        out.push(format!("⚠️  Anomalies ({})", report.anomalies.len()));
        for anomaly in &report.anomalies {
            let detail = match (&anomaly.merchant, anomaly.z) {
                (_, Some(z)) => format!("z={:.2}", z),
                (Some(merchant), None) => truncate(merchant, 20),
                (None, None) => String::new(),
            };
            out.push(format!(
                "   {:<22} {:<18} {:>10}  {} {}",
                truncate(&anomaly.period, 22),
                truncate(&anomaly.category, 18),
                money(anomaly.amount),
                anomaly.reason.as_str(),
                detail
            ));
        }
    }

    if !report.suggestions.is_empty() {
        out.push(String::new());
        out.push("💡 Suggestions".to_string());
        for (i, suggestion) in report.suggestions.iter().enumerate() {
            out.push(format!(
                "   {}. {} (save ~{})",
                i + 1,
                suggestion.title,
                money(suggestion.expected_saving)
            ));
            out.push(format!("      {}", suggestion.insight));
            out.push(format!("      → {}", suggestion.action));
        }
    }

    if !report.challenges.is_empty() {
        out.push(String::new());
        out.push("🏆 Challenges".to_string());
        for challenge in &report.challenges {
            out.push(format!(
                "   {} ({}d, {} pts, save ~{})",
                challenge.name,
                challenge.window_days,
                challenge.reward_points,
                money(challenge.expected_saving)
            ));
        }
    }

    out.push(String::new());
    out.join("\n")
}
